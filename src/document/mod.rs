mod assembler;
mod types;

pub use assembler::assemble;
pub use types::{CoverImage, DocumentFormat, ParsedDocument, TextUnit, COVER_CONTENT_TYPE};
