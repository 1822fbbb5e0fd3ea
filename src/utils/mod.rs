pub mod epub_parser;
pub mod ocr;
pub mod pdf_parser;
mod process;
pub mod raster;
pub mod temp;
pub mod text_processor;

pub use epub_parser::read_epub;
pub use ocr::{OcrEngine, OcrError, TesseractEngine};
pub use pdf_parser::{PdfExtractTextLayer, PdfReader, TextLayer};
pub use raster::{PdftoppmRasterizer, RasterPage, RasterSession, Rasterizer};
pub use text_processor::normalize;

use crate::error::{ParseError, ParseResult};

/// Bounded rayon pool owned by a single parse call
pub(crate) fn worker_pool(workers: usize) -> ParseResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| ParseError::Io(std::io::Error::other(e.to_string())))
}
