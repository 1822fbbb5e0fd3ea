// Library exports for use in the CLI binaries and other services

pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::IngestConfig;
pub use document::{DocumentFormat, ParsedDocument, TextUnit};
pub use error::{FailureKind, IngestError, ParseError};
pub use pipeline::Ingestor;
pub use storage::{DocumentSink, LocalDirectorySink, PublishedDocument};
