//! Ingestion entry point
//!
//! Picks the reader from the declared MIME type and runs it. Each call owns
//! its scratch files and raster session, so concurrent calls share nothing.

use tracing::info;

use crate::config::IngestConfig;
use crate::document::{DocumentFormat, ParsedDocument};
use crate::error::{IngestError, InputError};
use crate::storage::{DocumentSink, PublishedDocument};
use crate::utils::{read_epub, PdfReader};

pub struct Ingestor {
    config: IngestConfig,
    pdf: PdfReader,
}

impl Ingestor {
    /// Ingestor with the default PDF backends (pdf-extract, pdftoppm, tesseract)
    pub fn new(config: IngestConfig) -> Self {
        let pdf = PdfReader::from_config(&config);
        Self { config, pdf }
    }

    /// Ingestor with a caller-supplied PDF reader
    pub fn with_pdf_reader(config: IngestConfig, pdf: PdfReader) -> Self {
        Self { config, pdf }
    }

    /// Parse one uploaded file
    pub fn ingest(&self, bytes: &[u8], mime: &str) -> Result<ParsedDocument, IngestError> {
        let format = DocumentFormat::from_mime(mime)?;
        if bytes.is_empty() {
            return Err(InputError::EmptyInput.into());
        }
        info!(?format, bytes = bytes.len(), "Parsing uploaded document");

        let document = match format {
            DocumentFormat::Pdf => self.pdf.read(bytes)?,
            DocumentFormat::Epub => read_epub(bytes, &self.config)?,
        };
        Ok(document)
    }

    /// Parse one file and hand the result to the upload boundary
    pub fn ingest_and_publish(
        &self,
        bytes: &[u8],
        mime: &str,
        document_id: &str,
        sink: &dyn DocumentSink,
    ) -> Result<PublishedDocument, IngestError> {
        crate::storage::validate_document_id(document_id)?;
        let document = self.ingest(bytes, mime)?;
        Ok(sink.persist(document_id, &document)?)
    }
}
