use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use book_ingest::{DocumentFormat, DocumentSink, IngestConfig, Ingestor, LocalDirectorySink};

#[derive(Debug, Parser)]
#[command(author, version, about = "Ingest every book (PDF/EPUB) under a directory")]
struct Args {
    /// Input directory containing PDF/EPUB files
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for texts/, images/ and summary.json
    #[arg(short, long)]
    output: PathBuf,

    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DocumentReport {
    path: String,
    document_id: String,
    status: String,
    units: usize,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    total_documents: usize,
    succeeded: usize,
    failed: usize,
    documents: Vec<DocumentReport>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting batch ingestion");
    info!("Input directory: {:?}", args.input);
    info!("Output directory: {:?}", args.output);

    let config = match &args.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output))?;

    // Find all book files
    let mut book_files = Vec::new();

    for entry in WalkDir::new(&args.input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();

        if let Some(mime) = mime_of(path) {
            book_files.push((path.to_path_buf(), mime));
        }
    }

    info!("Found {} book files", book_files.len());

    if book_files.is_empty() {
        anyhow::bail!("No book files found in {:?}", args.input);
    }

    let ingestor = Ingestor::new(config);
    let sink = LocalDirectorySink::new(&args.output);
    let mut documents = Vec::new();

    for (idx, (book_path, mime)) in book_files.iter().enumerate() {
        info!("Processing {}/{}: {:?}", idx + 1, book_files.len(), book_path);

        let document_id = book_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let outcome = book_ingest::storage::validate_document_id(&document_id)
            .map_err(anyhow::Error::from)
            .and_then(|()| fs::read(book_path).with_context(|| format!("Failed to read {:?}", book_path)))
            .and_then(|bytes| {
                let parsed = ingestor.ingest(&bytes, mime)?;
                sink.persist(&document_id, &parsed)?;
                Ok(parsed.units().len())
            });

        let report = match outcome {
            Ok(units) => DocumentReport {
                path: book_path.display().to_string(),
                document_id,
                status: "ok".to_string(),
                units,
                error: None,
            },
            Err(e) => {
                warn!("Failed to process {:?}: {:#}", book_path, e);
                DocumentReport {
                    path: book_path.display().to_string(),
                    document_id,
                    status: "failed".to_string(),
                    units: 0,
                    error: Some(format!("{:#}", e)),
                }
            }
        };
        documents.push(report);
    }

    let succeeded = documents.iter().filter(|d| d.error.is_none()).count();
    let summary = BatchSummary {
        total_documents: documents.len(),
        succeeded,
        failed: documents.len() - succeeded,
        documents,
    };

    let summary_path = args.output.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    info!("Summary saved to: {:?}", summary_path);

    info!("Batch ingestion complete!");
    info!("  - Documents: {}", summary.total_documents);
    info!("  - Succeeded: {}", summary.succeeded);
    info!("  - Failed: {}", summary.failed);

    Ok(())
}

fn mime_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    DocumentFormat::mime_for_extension(ext)
}
