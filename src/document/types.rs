//! Document types
//!
//! The output contract handed to the upload boundary.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Content type every cover image is tagged with
pub const COVER_CONTENT_TYPE: &str = "image/jpeg";

/// Container format, chosen from the declared MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
}

impl DocumentFormat {
    pub fn from_mime(mime: &str) -> Result<Self, InputError> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "application/epub+zip" | "application/zip" => Ok(Self::Epub),
            other => Err(InputError::UnsupportedMediaType(other.to_string())),
        }
    }

    /// Best-effort MIME type for a file extension
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some("application/pdf"),
            "epub" => Some("application/epub+zip"),
            _ => None,
        }
    }
}

/// One ordinal-tagged text segment: a chapter (spine position) or a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// 1-based chapter index or page number
    pub ordinal: usize,
    pub text: String,
}

impl TextUnit {
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }
}

/// Cover image blob with its generated file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Extracted text units plus the selected cover.
///
/// Only `document::assemble` builds this, so `units` is never empty and the
/// cover is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub(crate) units: Vec<TextUnit>,
    pub(crate) cover: CoverImage,
}

impl ParsedDocument {
    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    pub fn cover(&self) -> &CoverImage {
        &self.cover
    }

    /// `units` as a JSON array of `{"ordinal", "text"}` objects
    pub fn texts_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_mime() {
        assert_eq!(DocumentFormat::from_mime("application/pdf").unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_mime("application/epub+zip").unwrap(), DocumentFormat::Epub);
        assert_eq!(DocumentFormat::from_mime("Application/ZIP").unwrap(), DocumentFormat::Epub);
        assert!(matches!(
            DocumentFormat::from_mime("text/plain"),
            Err(InputError::UnsupportedMediaType(m)) if m == "text/plain"
        ));
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(DocumentFormat::mime_for_extension("PDF"), Some("application/pdf"));
        assert_eq!(DocumentFormat::mime_for_extension("epub"), Some("application/epub+zip"));
        assert_eq!(DocumentFormat::mime_for_extension("mobi"), None);
    }

    #[test]
    fn test_text_unit_json_shape() {
        let unit = TextUnit::new(2, "Hello");
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json, serde_json::json!({"ordinal": 2, "text": "Hello"}));
    }
}
