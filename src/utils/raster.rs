//! Page rasterization
//!
//! Renders PDF pages to JPEG images for OCR input and the cover. The default
//! backend shells out to `pdftoppm` (poppler-utils).
//! Install:
//! - Linux: sudo apt-get install poppler-utils
//! - Mac: brew install poppler

use image::codecs::jpeg::JpegEncoder;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{ParseError, ParseResult};
use crate::utils::process::{run_with_deadline, Completion};
use crate::utils::temp::{persist_scoped, random_id};

/// One rendered page, JPEG encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// 1-based
    pub page_number: usize,
    pub image: Vec<u8>,
}

/// Opens rasterization sessions over PDF bytes
pub trait Rasterizer: Send + Sync {
    fn open<'a>(&'a self, pdf: &[u8]) -> ParseResult<Box<dyn RasterSession + 'a>>;
}

/// Renders pages of one document on demand. Resources are released on drop.
pub trait RasterSession: Send + Sync {
    /// Rendering still running at `deadline` is abandoned with a
    /// `RasterizationFailure`
    fn render(&self, page_number: usize, deadline: Option<Instant>) -> ParseResult<RasterPage>;
}

/// `pdftoppm` backed rasterizer
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
    dpi: u32,
    jpeg_quality: u8,
    temp_dir: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            binary: config.raster.pdftoppm_path.clone(),
            dpi: config.raster.dpi(),
            jpeg_quality: config.raster.jpeg_quality,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Check if pdftoppm can be spawned
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary).arg("-v").output().is_ok()
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn open<'a>(&'a self, pdf: &[u8]) -> ParseResult<Box<dyn RasterSession + 'a>> {
        fs::create_dir_all(&self.temp_dir)?;
        let source = persist_scoped(&self.temp_dir, pdf, ".pdf")?;
        let out_dir = tempfile::Builder::new()
            .prefix(&format!("raster-{}-", random_id()))
            .tempdir_in(&self.temp_dir)?;

        Ok(Box::new(PdftoppmSession {
            rasterizer: self,
            source,
            out_dir,
        }))
    }
}

struct PdftoppmSession<'a> {
    rasterizer: &'a PdftoppmRasterizer,
    source: NamedTempFile,
    out_dir: TempDir,
}

impl RasterSession for PdftoppmSession<'_> {
    fn render(&self, page_number: usize, deadline: Option<Instant>) -> ParseResult<RasterPage> {
        let fail = |reason: String| ParseError::RasterizationFailure {
            page: page_number,
            reason,
        };
        let page = page_number.to_string();
        let dpi = self.rasterizer.dpi.to_string();
        let out_base = self.out_dir.path().join(format!("page-{}", page_number));

        let mut command = Command::new(&self.rasterizer.binary);
        command
            .args(["-f", page.as_str(), "-l", page.as_str(), "-r", dpi.as_str()])
            .args(["-png", "-singlefile"])
            .arg(self.source.path())
            .arg(&out_base);

        let completion = run_with_deadline(&mut command, deadline).map_err(|e| match e.kind() {
            ErrorKind::NotFound => fail(format!(
                "{} not found, install poppler-utils",
                self.rasterizer.binary.display()
            )),
            _ => fail(format!("failed to run {}: {}", self.rasterizer.binary.display(), e)),
        })?;
        let output = match completion {
            Completion::Finished(output) => output,
            Completion::TimedOut => return Err(fail("rendering did not finish before the deadline".to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("pdftoppm exited with {}: {}", output.status, stderr.trim())));
        }

        let png_path = out_base.with_extension("png");
        let png = read_and_remove(&png_path).map_err(|e| fail(format!("missing output {:?}: {}", png_path, e)))?;
        let image = encode_jpeg(&png, self.rasterizer.jpeg_quality).map_err(fail)?;
        debug!(page = page_number, bytes = image.len(), "Rasterized page");

        Ok(RasterPage { page_number, image })
    }
}

fn read_and_remove(path: &Path) -> std::io::Result<Vec<u8>> {
    let bytes = fs::read(path)?;
    fs::remove_file(path)?;
    Ok(bytes)
}

/// Decode any supported image format and re-encode it as JPEG
pub fn encode_jpeg(data: &[u8], quality: u8) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(data).map_err(|e| format!("undecodable page image: {}", e))?;
    let rgb = decoded.to_rgb8();

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_encode_jpeg_from_png() {
        let img = RgbImage::from_pixel(8, 6, Rgb([200, 10, 10]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png).unwrap();

        let jpeg = encode_jpeg(&png, 85).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8, 0xFF]));

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_encode_jpeg_rejects_garbage() {
        assert!(encode_jpeg(b"not an image", 85).is_err());
    }

    #[test]
    fn test_missing_binary_is_rasterization_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig {
            temp_dir: dir.path().to_path_buf(),
            ..IngestConfig::default()
        };
        config.raster.pdftoppm_path = PathBuf::from("/nonexistent/bin/pdftoppm");
        let rasterizer = PdftoppmRasterizer::from_config(&config);
        assert!(!rasterizer.is_available());

        let session = rasterizer.open(b"%PDF-1.4").unwrap();
        let err = session.render(1, None).unwrap_err();
        assert!(matches!(err, ParseError::RasterizationFailure { page: 1, .. }));

        drop(session);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
