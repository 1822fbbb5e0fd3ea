//! OCR fallback for pages without a text layer.
//!
//! The default engine runs the Tesseract CLI.
//! Install:
//! - Windows: https://github.com/UB-Mannheim/tesseract/wiki
//! - Linux: sudo apt-get install tesseract-ocr
//! - Mac: brew install tesseract

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{ParseError, ParseResult};
use crate::utils::process::{run_with_deadline, Completion};
use crate::utils::temp::persist_scoped;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),

    #[error("OCR processing failed: {0}")]
    Processing(String),

    #[error("OCR did not finish before the deadline")]
    TimedOut,
}

/// Recognizes text in a page image
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Raw recognized text; an empty string is a valid result for a blank page.
    /// Work still running at `deadline` is abandoned with `OcrError::TimedOut`.
    fn recognize(&self, image: &[u8], deadline: Instant) -> Result<String, OcrError>;
}

/// Tesseract CLI engine
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    temp_dir: PathBuf,
}

impl TesseractEngine {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            binary: config.ocr.tesseract_path.clone(),
            language: config.ocr.language.clone(),
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Check if tesseract can be spawned
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary).arg("--version").output().is_ok()
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &[u8], deadline: Instant) -> Result<String, OcrError> {
        fs::create_dir_all(&self.temp_dir)
            .map_err(|e| OcrError::Processing(format!("Failed to create temp dir: {}", e)))?;
        let input = persist_scoped(&self.temp_dir, image, ".jpg")
            .map_err(|e| OcrError::Processing(format!("Failed to write temp file: {}", e)))?;

        let mut command = Command::new(&self.binary);
        command
            .arg(input.path())
            .arg("stdout")
            .args(["-l", self.language.as_str()])
            .args(["--oem", "3", "--psm", "3"]);

        let completion = run_with_deadline(&mut command, Some(deadline)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => OcrError::NotAvailable(format!(
                "{} is not installed or not in PATH",
                self.binary.display()
            )),
            _ => OcrError::Processing(format!("Failed to run tesseract: {}", e)),
        })?;
        let output = match completion {
            Completion::Finished(output) => output,
            Completion::TimedOut => return Err(OcrError::TimedOut),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Processing(format!("Tesseract failed: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "Tesseract recognized text");
        Ok(text)
    }
}

/// Bounds OCR work for one document by page count and wall clock
#[derive(Debug, Clone, Copy)]
pub struct OcrBudget {
    deadline: Instant,
    timeout: Duration,
    max_pages: Option<usize>,
}

impl OcrBudget {
    pub fn start(timeout: Duration, max_pages: Option<usize>) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            max_pages,
        }
    }

    pub fn check_pages(&self, pages: usize) -> ParseResult<()> {
        match self.max_pages {
            Some(max) if pages > max => Err(ParseError::OcrBudgetExceeded(format!(
                "{} image-only pages exceed the limit of {}",
                pages, max
            ))),
            _ => Ok(()),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn check_deadline(&self, page: usize) -> ParseResult<()> {
        if Instant::now() >= self.deadline {
            return Err(self.exceeded(page));
        }
        Ok(())
    }

    pub fn exceeded(&self, page: usize) -> ParseError {
        ParseError::OcrBudgetExceeded(format!("OCR exceeded {:?} at page {}", self.timeout, page))
    }
}
