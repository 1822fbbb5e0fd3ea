use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use book_ingest::utils::{PdftoppmRasterizer, TesseractEngine};
use book_ingest::{DocumentFormat, IngestConfig, Ingestor, LocalDirectorySink};

#[derive(Debug, Parser)]
#[command(author, version, about = "E-book ingestion CLI (EPUB/PDF text and cover extraction)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse one book and publish its text and cover
    Parse(ParseArgs),
    /// Report whether the external OCR tools are installed
    Doctor(DoctorArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Path to the EPUB or PDF file
    #[arg(short, long)]
    input: PathBuf,

    /// Declared MIME type, inferred from the extension when omitted
    #[arg(long)]
    mime: Option<String>,

    /// Identifier the published objects are named after, defaults to the file stem
    #[arg(long)]
    document_id: Option<String>,

    /// Output directory for texts/ and images/
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DoctorArgs {
    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse(args) => parse_command(args),
        Commands::Doctor(args) => doctor_command(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            IngestConfig::load(path)
        }
        None => Ok(IngestConfig::default()),
    }
}

fn parse_command(args: ParseArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let mime = match args.mime {
        Some(mime) => mime,
        None => infer_mime(&args.input)?.to_string(),
    };
    let document_id = match args.document_id {
        Some(id) => id,
        None => args
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Input file has no usable name, pass --document-id")?
            .to_string(),
    };

    let bytes = fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {:?}", args.input))?;

    let ingestor = Ingestor::new(config);
    let sink = LocalDirectorySink::new(&args.output);

    let published = ingestor
        .ingest_and_publish(&bytes, &mime, &document_id, &sink)
        .map_err(|e| anyhow!("{}: {}", e.kind(), e))?;

    println!("{}", serde_json::to_string_pretty(&published)?);
    Ok(())
}

fn doctor_command(args: DoctorArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let pdftoppm = PdftoppmRasterizer::from_config(&config).is_available();
    let tesseract = TesseractEngine::from_config(&config).is_available();

    if pdftoppm {
        info!("pdftoppm is available");
    } else {
        warn!("pdftoppm is not installed: PDF covers and OCR input cannot be rendered");
    }
    if tesseract {
        info!("tesseract is available");
    } else {
        warn!("tesseract is not installed: image-only PDF pages cannot be recognized");
    }

    println!(
        "{}",
        serde_json::json!({ "pdftoppm": pdftoppm, "tesseract": tesseract })
    );
    Ok(())
}

fn infer_mime(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    DocumentFormat::mime_for_extension(ext)
        .ok_or_else(|| anyhow!("Cannot infer file type from {:?}, pass --mime", path))
}
