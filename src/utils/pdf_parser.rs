use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{IngestConfig, OcrConfig};
use crate::document::{assemble, ParsedDocument, TextUnit};
use crate::error::{ParseError, ParseResult};
use crate::utils::ocr::{OcrBudget, OcrEngine, OcrError};
use crate::utils::raster::{RasterSession, Rasterizer};
use crate::utils::text_processor::normalize;
use crate::utils::worker_pool;

/// Embedded text layer, one string per page in page order
pub trait TextLayer: Send + Sync {
    fn extract_pages(&self, pdf: &[u8]) -> ParseResult<Vec<String>>;
}

/// Text layer extraction with `pdf-extract`
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractTextLayer;

impl TextLayer for PdfExtractTextLayer {
    fn extract_pages(&self, pdf: &[u8]) -> ParseResult<Vec<String>> {
        // pdf-extract panics on some malformed inputs
        let result = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(pdf)));

        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ParseError::DocumentCorrupt(e.to_string())),
            Err(_) => Err(ParseError::DocumentCorrupt("text extraction panicked".to_string())),
        }
    }
}

/// Page reader: native text where present, OCR of the rendered page otherwise
pub struct PdfReader {
    text_layer: Arc<dyn TextLayer>,
    rasterizer: Arc<dyn Rasterizer>,
    ocr: Arc<dyn OcrEngine>,
    ocr_timeout: Duration,
    ocr_page_limit: Option<usize>,
    ocr_workers: usize,
}

enum PageSource {
    Native(TextUnit),
    NeedsOcr(usize),
}

impl PdfReader {
    pub fn new(
        text_layer: Arc<dyn TextLayer>,
        rasterizer: Arc<dyn Rasterizer>,
        ocr: Arc<dyn OcrEngine>,
        config: &OcrConfig,
    ) -> Self {
        Self {
            text_layer,
            rasterizer,
            ocr,
            ocr_timeout: config.timeout(),
            ocr_page_limit: config.page_limit(),
            ocr_workers: config.workers,
        }
    }

    /// Reader backed by pdf-extract, pdftoppm and tesseract
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            Arc::new(PdfExtractTextLayer),
            Arc::new(crate::utils::PdftoppmRasterizer::from_config(config)),
            Arc::new(crate::utils::TesseractEngine::from_config(config)),
            &config.ocr,
        )
    }

    pub fn read(&self, bytes: &[u8]) -> ParseResult<ParsedDocument> {
        info!("Extracting text from PDF ({} bytes)", bytes.len());

        let pages = self.text_layer.extract_pages(bytes)?;
        if pages.is_empty() {
            return Err(ParseError::EmptyDocument);
        }
        info!("Extracted text layer for {} pages", pages.len());

        // Dropping the session releases its resources on every path out of here
        let session = self.rasterizer.open(bytes)?;
        let cover = session.render(1, None)?;

        let mut units = Vec::with_capacity(pages.len());
        let mut ocr_pages = Vec::new();
        for source in classify_pages(&pages) {
            match source {
                PageSource::Native(unit) => units.push(unit),
                PageSource::NeedsOcr(page) => ocr_pages.push(page),
            }
        }

        if !ocr_pages.is_empty() {
            units.extend(self.recognize_pages(session.as_ref(), &cover.image, &ocr_pages)?);
        }
        drop(session);

        units.sort_by_key(|unit| unit.ordinal);
        info!(
            "PDF parsed: {} pages, {} via OCR with {}",
            units.len(),
            ocr_pages.len(),
            self.ocr.name()
        );

        Ok(assemble(units, cover.image)?)
    }

    fn recognize_pages(
        &self,
        session: &dyn RasterSession,
        page_one: &[u8],
        pages: &[usize],
    ) -> ParseResult<Vec<TextUnit>> {
        let budget = OcrBudget::start(self.ocr_timeout, self.ocr_page_limit);
        budget.check_pages(pages.len())?;

        let pool = worker_pool(self.ocr_workers)?;
        pool.install(|| {
            pages
                .par_iter()
                .map(|&page| -> ParseResult<TextUnit> {
                    budget.check_deadline(page)?;
                    let deadline = budget.deadline();

                    // Page 1 is already rendered for the cover
                    let rendered;
                    let image = if page == 1 {
                        page_one
                    } else {
                        rendered = session.render(page, Some(deadline)).map_err(|e| {
                            if Instant::now() >= deadline {
                                budget.exceeded(page)
                            } else {
                                e
                            }
                        })?;
                        rendered.image.as_slice()
                    };

                    let text = self.ocr.recognize(image, deadline).map_err(|e| match e {
                        OcrError::TimedOut => {
                            warn!(page, "OCR abandoned at the deadline");
                            budget.exceeded(page)
                        }
                        e => {
                            warn!(page, error = %e, "OCR failed");
                            ParseError::OcrEngineFailure {
                                page,
                                reason: e.to_string(),
                            }
                        }
                    })?;
                    budget.check_deadline(page)?;

                    Ok(TextUnit::new(page, normalize(&text)))
                })
                .collect()
        })
    }
}

fn classify_pages(pages: &[String]) -> Vec<PageSource> {
    pages
        .iter()
        .enumerate()
        .map(|(idx, text)| {
            let page = idx + 1;
            if text.trim().is_empty() {
                info!("Page {} has no text layer, using OCR", page);
                PageSource::NeedsOcr(page)
            } else {
                info!("Page {} found text", page);
                PageSource::Native(TextUnit::new(page, normalize(text)))
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::raster::RasterPage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct StubTextLayer(ParseResult<Vec<String>>);

    impl TextLayer for StubTextLayer {
        fn extract_pages(&self, _pdf: &[u8]) -> ParseResult<Vec<String>> {
            match &self.0 {
                Ok(pages) => Ok(pages.clone()),
                Err(e) => Err(ParseError::DocumentCorrupt(e.to_string())),
            }
        }
    }

    pub(crate) fn text_layer(pages: &[&str]) -> Arc<StubTextLayer> {
        Arc::new(StubTextLayer(Ok(pages.iter().map(|p| p.to_string()).collect())))
    }

    #[derive(Default)]
    pub(crate) struct StubRasterizer {
        failing_page: Option<usize>,
        /// Bytes returned for every page instead of the page label
        image: Option<Vec<u8>>,
        rendered: Mutex<Vec<usize>>,
        released: Arc<AtomicBool>,
    }

    struct StubSession<'a> {
        rasterizer: &'a StubRasterizer,
    }

    impl Rasterizer for StubRasterizer {
        fn open<'a>(&'a self, _pdf: &[u8]) -> ParseResult<Box<dyn RasterSession + 'a>> {
            Ok(Box::new(StubSession { rasterizer: self }))
        }
    }

    impl RasterSession for StubSession<'_> {
        fn render(&self, page_number: usize, _deadline: Option<Instant>) -> ParseResult<RasterPage> {
            if self.rasterizer.failing_page == Some(page_number) {
                return Err(ParseError::RasterizationFailure {
                    page: page_number,
                    reason: "stub failure".to_string(),
                });
            }
            self.rasterizer.rendered.lock().unwrap().push(page_number);
            let image = match &self.rasterizer.image {
                Some(image) => image.clone(),
                None => format!("image-of-page-{}", page_number).into_bytes(),
            };
            Ok(RasterPage { page_number, image })
        }
    }

    impl Drop for StubSession<'_> {
        fn drop(&mut self) {
            self.rasterizer.released.store(true, Ordering::SeqCst);
        }
    }

    /// Echoes the image it was given, with messy whitespace
    #[derive(Default)]
    pub(crate) struct StubOcr {
        fail: bool,
        calls: AtomicUsize,
    }

    impl OcrEngine for StubOcr {
        fn name(&self) -> &str {
            "stub"
        }

        fn recognize(&self, image: &[u8], _deadline: Instant) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(OcrError::Processing("stub failure".to_string()));
            }
            Ok(format!("\n  recognized\t{} \n", String::from_utf8_lossy(image)))
        }
    }

    fn reader(text: Arc<dyn TextLayer>, raster: Arc<StubRasterizer>, ocr: Arc<StubOcr>) -> PdfReader {
        PdfReader::new(text, raster, ocr, &OcrConfig::default())
    }

    #[test]
    fn test_native_text_and_ocr_fallback() {
        let raster = Arc::new(StubRasterizer::default());
        let ocr = Arc::new(StubOcr::default());
        let doc = reader(text_layer(&["  Hello \n World ", "   \n"]), raster.clone(), ocr.clone())
            .read(b"%PDF")
            .unwrap();

        assert_eq!(doc.units().len(), 2);
        assert_eq!(doc.units()[0], TextUnit::new(1, "Hello World"));
        assert_eq!(doc.units()[1], TextUnit::new(2, "recognized image-of-page-2"));
        assert_eq!(doc.cover().data, b"image-of-page-1".to_vec());
        assert_eq!(doc.cover().content_type, "image/jpeg");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        assert!(raster.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_all_native_pages_skip_ocr() {
        let raster = Arc::new(StubRasterizer::default());
        let ocr = Arc::new(StubOcr::default());
        let doc = reader(text_layer(&["one", "two", "three"]), raster.clone(), ocr.clone())
            .read(b"%PDF")
            .unwrap();

        let ordinals: Vec<usize> = doc.units().iter().map(|u| u.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*raster.rendered.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_image_only_first_page_reuses_cover_render() {
        let raster = Arc::new(StubRasterizer::default());
        let ocr = Arc::new(StubOcr::default());
        let doc = reader(text_layer(&["", "text"]), raster.clone(), ocr).read(b"%PDF").unwrap();

        assert_eq!(doc.units()[0].text, "recognized image-of-page-1");
        assert_eq!(*raster.rendered.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_parallel_ocr_keeps_page_order() {
        let pages: Vec<&str> = (0..12).map(|i| if i % 3 == 0 { "native" } else { "" }).collect();
        let mut config = OcrConfig::default();
        config.workers = 4;
        let raster = Arc::new(StubRasterizer::default());
        let doc = PdfReader::new(text_layer(&pages), raster, Arc::new(StubOcr::default()), &config)
            .read(b"%PDF")
            .unwrap();

        for (idx, unit) in doc.units().iter().enumerate() {
            let page = idx + 1;
            assert_eq!(unit.ordinal, page);
            if idx % 3 == 0 {
                assert_eq!(unit.text, "native");
            } else {
                assert_eq!(unit.text, format!("recognized image-of-page-{}", page));
            }
        }
    }

    #[test]
    fn test_zero_pages_is_empty_document() {
        let raster = Arc::new(StubRasterizer::default());
        let err = reader(text_layer(&[]), raster.clone(), Arc::new(StubOcr::default()))
            .read(b"%PDF")
            .unwrap_err();

        assert!(matches!(err, ParseError::EmptyDocument));
        assert!(raster.rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_document() {
        let text = Arc::new(StubTextLayer(Err(ParseError::DocumentCorrupt("bad xref".to_string()))));
        let err = reader(text, Arc::new(StubRasterizer::default()), Arc::new(StubOcr::default()))
            .read(b"garbage")
            .unwrap_err();
        assert!(matches!(err, ParseError::DocumentCorrupt(_)));
    }

    #[test]
    fn test_cover_rasterization_failure_aborts() {
        let raster = Arc::new(StubRasterizer {
            failing_page: Some(1),
            ..Default::default()
        });
        let err = reader(text_layer(&["text"]), raster.clone(), Arc::new(StubOcr::default()))
            .read(b"%PDF")
            .unwrap_err();

        assert!(matches!(err, ParseError::RasterizationFailure { page: 1, .. }));
        assert!(raster.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ocr_page_rasterization_failure_aborts() {
        let raster = Arc::new(StubRasterizer {
            failing_page: Some(3),
            ..Default::default()
        });
        let err = reader(text_layer(&["a", "", ""]), raster.clone(), Arc::new(StubOcr::default()))
            .read(b"%PDF")
            .unwrap_err();

        assert!(matches!(err, ParseError::RasterizationFailure { page: 3, .. }));
        assert!(raster.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ocr_failure_aborts_document() {
        let raster = Arc::new(StubRasterizer::default());
        let ocr = Arc::new(StubOcr {
            fail: true,
            ..Default::default()
        });
        let err = reader(text_layer(&["a", ""]), raster.clone(), ocr).read(b"%PDF").unwrap_err();

        assert!(matches!(err, ParseError::OcrEngineFailure { page: 2, .. }));
        assert!(raster.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ocr_page_limit() {
        let mut config = OcrConfig::default();
        config.max_pages = 1;
        let ocr = Arc::new(StubOcr::default());
        let err = PdfReader::new(
            text_layer(&["", "", "text"]),
            Arc::new(StubRasterizer::default()),
            ocr.clone(),
            &config,
        )
        .read(b"%PDF")
        .unwrap_err();

        assert!(matches!(err, ParseError::OcrBudgetExceeded(_)));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ocr_timeout() {
        let mut pdf_reader = reader(
            text_layer(&["", "text"]),
            Arc::new(StubRasterizer::default()),
            Arc::new(StubOcr::default()),
        );
        pdf_reader.ocr_timeout = Duration::ZERO;

        let err = pdf_reader.read(b"%PDF").unwrap_err();
        assert!(matches!(err, ParseError::OcrBudgetExceeded(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_ocr_engine_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig {
            temp_dir: dir.path().to_path_buf(),
            ..IngestConfig::default()
        };
        // sh runs the rendered "image" as a script
        config.ocr.tesseract_path = std::path::PathBuf::from("sh");
        config.ocr.timeout_secs = 1;
        let raster = Arc::new(StubRasterizer {
            image: Some(b"exec sleep 30\n".to_vec()),
            ..Default::default()
        });
        let pdf_reader = PdfReader::new(
            text_layer(&["x", ""]),
            raster.clone(),
            Arc::new(crate::utils::TesseractEngine::from_config(&config)),
            &config.ocr,
        );

        let started = std::time::Instant::now();
        let err = pdf_reader.read(b"%PDF").unwrap_err();

        assert!(matches!(err, ParseError::OcrBudgetExceeded(ref msg) if msg.contains("page 2")));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(raster.released.load(Ordering::SeqCst));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ocr_timed_out_maps_to_budget_exceeded() {
        struct SlowOcr;
        impl OcrEngine for SlowOcr {
            fn name(&self) -> &str {
                "slow"
            }
            fn recognize(&self, _image: &[u8], _deadline: Instant) -> Result<String, OcrError> {
                Err(OcrError::TimedOut)
            }
        }

        let err = PdfReader::new(
            text_layer(&["text", ""]),
            Arc::new(StubRasterizer::default()),
            Arc::new(SlowOcr),
            &OcrConfig::default(),
        )
        .read(b"%PDF")
        .unwrap_err();
        assert!(matches!(err, ParseError::OcrBudgetExceeded(_)));
    }

    #[test]
    fn test_blank_ocr_result_is_not_an_error() {
        struct BlankOcr;
        impl OcrEngine for BlankOcr {
            fn name(&self) -> &str {
                "blank"
            }
            fn recognize(&self, _image: &[u8], _deadline: Instant) -> Result<String, OcrError> {
                Ok(" \n\n ".to_string())
            }
        }

        let doc = PdfReader::new(
            text_layer(&["text", ""]),
            Arc::new(StubRasterizer::default()),
            Arc::new(BlankOcr),
            &OcrConfig::default(),
        )
        .read(b"%PDF")
        .unwrap();
        assert_eq!(doc.units()[1], TextUnit::new(2, ""));
    }

    #[test]
    fn test_pdf_extract_rejects_garbage() {
        let err = PdfExtractTextLayer.extract_pages(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, ParseError::DocumentCorrupt(_)));
    }
}
