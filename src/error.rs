//! Error types
//!
//! Failures are split by who is at fault: the caller (`InputError`), the
//! document or an extraction tool (`ParseError`), a reader breaking the output
//! contract (`AssemblyError`), or the upload boundary (`StorageError`).

use thiserror::Error;

/// Wrong type or shape of the request. Never retried.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Input file is empty")]
    EmptyInput,

    #[error("Invalid document id: {0:?}")]
    InvalidDocumentId(String),
}

/// Output contract violations raised by the result assembler
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Document has no text units")]
    EmptyDocument,

    #[error("Document has no cover image")]
    MissingCover,
}

/// Whole-document extraction failures. No partial results accompany these.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("EPUB archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("PDF document is corrupt: {0}")]
    DocumentCorrupt(String),

    #[error("No manifest entry looks like a cover image")]
    NoCoverFound,

    #[error("Document contains no readable units")]
    EmptyDocument,

    #[error("Failed to read chapter {chapter}: {reason}")]
    ChapterReadFailure { chapter: String, reason: String },

    #[error("Failed to rasterize page {page}: {reason}")]
    RasterizationFailure { page: usize, reason: String },

    #[error("OCR failed on page {page}: {reason}")]
    OcrEngineFailure { page: usize, reason: String },

    #[error("OCR budget exceeded: {0}")]
    OcrBudgetExceeded(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Failures at the upload boundary
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write {object}: {source}")]
    Write {
        object: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize text payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Coarse user-visible classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BadInput,
    ParseFailed,
    PersistFailed,
}

/// Top-level error returned by the ingestion entry points
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Input(_) => FailureKind::BadInput,
            Self::Parse(_) => FailureKind::ParseFailed,
            Self::Storage(_) => FailureKind::PersistFailed,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::BadInput => "bad input",
            Self::ParseFailed => "parsing failed",
            Self::PersistFailed => "persistence failed",
        };
        f.write_str(label)
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
