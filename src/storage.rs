//! Upload boundary
//!
//! Persists a parsed document as a text object (`texts/<id>.txt`) and an
//! image object (`images/<id>.jpeg`), overwriting earlier uploads, and
//! returns their URLs. Remote object stores implement `DocumentSink`; the
//! crate ships a local-directory implementation.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::document::ParsedDocument;
use crate::error::{InputError, StorageError};

const TEXTS_AREA: &str = "texts";
const IMAGES_AREA: &str = "images";

/// Public locations of a persisted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedDocument {
    pub text_url: String,
    pub cover_url: String,
}

pub trait DocumentSink: Send + Sync {
    fn persist(&self, document_id: &str, document: &ParsedDocument) -> Result<PublishedDocument, StorageError>;
}

/// Ids become object names, so they must be non-empty single path components
pub fn validate_document_id(document_id: &str) -> Result<(), InputError> {
    let valid = !document_id.trim().is_empty()
        && document_id != "."
        && document_id != ".."
        && !document_id.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(InputError::InvalidDocumentId(document_id.to_string()))
    }
}

/// Stores objects under `<root>/texts` and `<root>/images`
#[derive(Debug, Clone)]
pub struct LocalDirectorySink {
    root: PathBuf,
}

impl LocalDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_object(&self, area: &str, name: &str, data: &[u8]) -> Result<String, StorageError> {
        let object = format!("{}/{}", area, name);
        let write_err = |source: std::io::Error| StorageError::Write {
            object: object.clone(),
            source,
        };

        let dir = self.root.join(area);
        fs::create_dir_all(&dir).map_err(write_err)?;
        let path = dir.join(name);
        fs::write(&path, data).map_err(write_err)?;

        Ok(file_url(&path))
    }
}

impl DocumentSink for LocalDirectorySink {
    fn persist(&self, document_id: &str, document: &ParsedDocument) -> Result<PublishedDocument, StorageError> {
        let texts = document.texts_json()?;
        let text_url = self.write_object(TEXTS_AREA, &format!("{}.txt", document_id), texts.as_bytes())?;
        let cover_url = self.write_object(IMAGES_AREA, &format!("{}.jpeg", document_id), &document.cover().data)?;

        info!(document_id, %text_url, %cover_url, "Persisted document");
        Ok(PublishedDocument { text_url, cover_url })
    }
}

fn file_url(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
