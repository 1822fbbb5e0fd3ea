use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Upscaling factor relative to 72 DPI
    pub scale: f32,
    pub jpeg_quality: u8,
    pub pdftoppm_path: PathBuf,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            scale: 3.0,
            jpeg_quality: 85,
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

impl RasterConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.scale > 0.0 && self.scale <= 8.0, "raster.scale must be within (0, 8]");
        ensure!((1..=100).contains(&self.jpeg_quality), "raster.jpeg_quality must be within [1, 100]");
        Ok(())
    }

    /// Render resolution handed to the rasterizer
    pub fn dpi(&self) -> u32 {
        (72.0 * self.scale).round() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: PathBuf,
    pub language: String,
    /// Upper bound on image-only pages per document, 0 disables the bound
    pub max_pages: usize,
    /// Wall-clock bound on all OCR work for one document
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            max_pages: 200,
            timeout_secs: 600,
            workers: 1,
        }
    }
}

impl OcrConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.language.trim().is_empty(), "ocr.language must not be empty");
        ensure!(self.timeout_secs > 0, "ocr.timeout_secs must be > 0");
        ensure!(self.workers > 0, "ocr.workers must be > 0");
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn page_limit(&self) -> Option<usize> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpubConfig {
    pub chapter_workers: usize,
}

impl Default for EpubConfig {
    fn default() -> Self {
        Self { chapter_workers: 4 }
    }
}

impl EpubConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.chapter_workers > 0, "epub.chapter_workers must be > 0");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub temp_dir: PathBuf,
    pub raster: RasterConfig,
    pub ocr: OcrConfig,
    pub epub: EpubConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            raster: RasterConfig::default(),
            ocr: OcrConfig::default(),
            epub: EpubConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.temp_dir.as_os_str().is_empty(), "temp_dir must not be empty");
        self.raster.validate()?;
        self.ocr.validate()?;
        self.epub.validate()?;
        Ok(())
    }
}

impl fmt::Display for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
