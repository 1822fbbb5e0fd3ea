use rayon::prelude::*;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::config::IngestConfig;
use crate::document::{assemble, ParsedDocument, TextUnit};
use crate::error::{ParseError, ParseResult};
use crate::utils::temp::persist_scoped;
use crate::utils::text_processor::normalize;
use crate::utils::worker_pool;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// One declared resource of the OPF manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub media_type: String,
    pub href: String,
}

/// Manifest (declaration order) and spine idrefs (reading order)
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub manifest: Vec<ManifestEntry>,
    pub spine: Vec<String>,
    /// Directory of the OPF inside the archive, hrefs are relative to it
    pub base_dir: String,
}

impl Package {
    fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|e| e.id == id)
    }
}

/// Parse an EPUB held in memory into chapter text units and its cover image
pub fn read_epub(bytes: &[u8], config: &IngestConfig) -> ParseResult<ParsedDocument> {
    fs::create_dir_all(&config.temp_dir)?;
    // Removed when `scratch` drops, on success and on every `?` below
    let scratch = persist_scoped(&config.temp_dir, bytes, ".epub")?;
    info!("Extracting text from EPUB: {:?}", scratch.path());

    let mut archive = open_archive(scratch.path())?;
    let package = read_package(&mut archive)?;
    info!(
        "EPUB manifest has {} entries, spine has {} chapters",
        package.manifest.len(),
        package.spine.len()
    );

    let cover_entry = find_cover(&package.manifest).ok_or(ParseError::NoCoverFound)?;
    debug!(id = %cover_entry.id, href = %cover_entry.href, "Selected cover entry");
    let cover_path = resolve_href(&package.base_dir, &cover_entry.href);
    let cover = read_entry(&mut archive, &cover_path)
        .map_err(|e| ParseError::ArchiveCorrupt(format!("cover image {}: {}", cover_path, e)))?;

    let chapters = package
        .spine
        .iter()
        .map(|idref| {
            package
                .entry(idref)
                .map(|entry| (idref.as_str(), resolve_href(&package.base_dir, &entry.href)))
                .ok_or_else(|| ParseError::ChapterReadFailure {
                    chapter: idref.clone(),
                    reason: "spine item is not declared in the manifest".to_string(),
                })
        })
        .collect::<ParseResult<Vec<_>>>()?;

    let mut units = read_chapters(scratch.path(), &chapters, config.epub.chapter_workers)?;
    units.sort_by_key(|unit| unit.ordinal);

    if units.is_empty() {
        return Err(ParseError::EmptyDocument);
    }

    info!("Extracted {} chapters from EPUB", units.len());
    Ok(assemble(units, cover)?)
}

/// Select the first image entry, in manifest order, whose id or href
/// contains "cover" (ASCII case-insensitive).
pub fn find_cover(manifest: &[ManifestEntry]) -> Option<&ManifestEntry> {
    manifest.iter().find(|entry| {
        entry.media_type.starts_with("image/")
            && (contains_cover(&entry.id) || contains_cover(&entry.href))
    })
}

fn contains_cover(s: &str) -> bool {
    s.to_ascii_lowercase().contains("cover")
}

fn open_archive(path: &Path) -> ParseResult<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| ParseError::ArchiveCorrupt(e.to_string()))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, String> {
    let mut entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf).map_err(|e| e.to_string())?;
    Ok(buf)
}

fn read_xml(archive: &mut ZipArchive<File>, name: &str) -> ParseResult<String> {
    let bytes = read_entry(archive, name).map_err(|e| ParseError::ArchiveCorrupt(format!("{}: {}", name, e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ParseError::ArchiveCorrupt(format!("{} is not UTF-8: {}", name, e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Locate the OPF through `META-INF/container.xml` and parse it
fn read_package(archive: &mut ZipArchive<File>) -> ParseResult<Package> {
    let container = read_xml(archive, CONTAINER_PATH)?;
    let opf_path = parse_container(&container)?;
    let opf = read_xml(archive, &opf_path)?;

    let base_dir = match opf_path.rfind('/') {
        Some(idx) => opf_path[..idx].to_string(),
        None => String::new(),
    };
    parse_opf(&opf, base_dir)
}

fn parse_container(xml: &str) -> ParseResult<String> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ParseError::ArchiveCorrupt(format!("container.xml: {}", e)))?;

    doc.descendants()
        .filter(|n| n.has_tag_name("rootfile"))
        .find_map(|n| n.attribute("full-path"))
        .map(|p| p.trim_start_matches('/').to_string())
        .ok_or_else(|| ParseError::ArchiveCorrupt("container.xml declares no rootfile".to_string()))
}

/// Parse manifest and spine from OPF markup, keeping declaration order
pub fn parse_opf(xml: &str, base_dir: String) -> ParseResult<Package> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ParseError::ArchiveCorrupt(format!("package document: {}", e)))?;

    let manifest = doc
        .descendants()
        .filter(|n| n.has_tag_name("item"))
        .filter_map(|n| {
            Some(ManifestEntry {
                id: n.attribute("id")?.to_string(),
                media_type: n.attribute("media-type").unwrap_or_default().to_string(),
                href: n.attribute("href")?.to_string(),
            })
        })
        .collect();

    let spine = doc
        .descendants()
        .filter(|n| n.has_tag_name("itemref"))
        .filter_map(|n| n.attribute("idref"))
        .map(str::to_string)
        .collect();

    Ok(Package {
        manifest,
        spine,
        base_dir,
    })
}

/// Resolve a manifest href against the OPF directory into an archive path
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = urlencoding::decode(href)
        .map(|h| h.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let joined = if href.starts_with('/') || base_dir.is_empty() {
        href
    } else {
        format!("{}/{}", base_dir, href)
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Fetch and normalize every chapter on a bounded pool. Each worker opens
/// its own handle on the scratch file; the first failure aborts the lot.
fn read_chapters(archive_path: &Path, chapters: &[(&str, String)], workers: usize) -> ParseResult<Vec<TextUnit>> {
    let pool = worker_pool(workers)?;

    pool.install(|| {
        chapters
            .par_iter()
            .enumerate()
            .map_init(
                || open_archive(archive_path).map_err(|e| e.to_string()),
                |archive, (idx, (id, path))| -> ParseResult<TextUnit> {
                    let archive = archive.as_mut().map_err(|e| ParseError::ArchiveCorrupt(e.clone()))?;
                    let bytes = read_entry(archive, path).map_err(|reason| ParseError::ChapterReadFailure {
                        chapter: id.to_string(),
                        reason,
                    })?;
                    let markup = String::from_utf8_lossy(&bytes);
                    debug!(chapter = %id, bytes = bytes.len(), "Read chapter");
                    Ok(TextUnit::new(idx + 1, normalize(&markup)))
                },
            )
            .collect()
    })
}
