//! Corpus discovery and document loading.
//!
//! Two formats are accepted:
//!
//! | Extension | Loader | One [`Document`] per | Position |
//! |-----------|--------|----------------------|----------|
//! | `.csv` | tabular | data row | 0-based row index |
//! | `.pdf` | paginated | page | 1-based page number |
//!
//! Anything else fails with [`RagError::UnsupportedFormat`]; unreadable or
//! corrupt files fail with [`RagError::Ingest`]. Both abort startup.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use helpdesk_rag_core::{Document, DocumentKind, RagError};

use crate::config::CorpusConfig;

/// Recognised corpus formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Pdf,
}

impl Format {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(Format::Csv),
            Some("pdf") => Ok(Format::Pdf),
            _ => Err(RagError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// List the corpus files to ingest.
///
/// Explicit `paths` are returned as given. Otherwise `root` is walked and
/// files matching `include_globs` (relative to `root`) are returned, sorted.
pub fn discover_corpus(config: &CorpusConfig) -> Result<Vec<PathBuf>> {
    if !config.paths.is_empty() {
        return Ok(config.paths.clone());
    }

    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&["**/.git/**".to_string()])?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    // Sort for deterministic corpus order
    files.sort();

    info!(root = %root.display(), files = files.len(), "discovered corpus");
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Load every file into documents, in path order.
///
/// Blank pages and rows are dropped.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>, RagError> {
    let mut documents = Vec::new();

    for path in paths {
        let loaded = match Format::from_path(path)? {
            Format::Csv => load_csv(path)?,
            Format::Pdf => load_pdf(path)?,
        };
        debug!(path = %path.display(), documents = loaded.len(), "loaded file");
        documents.extend(loaded);
    }

    info!(
        files = paths.len(),
        documents = documents.len(),
        "ingested corpus"
    );
    Ok(documents)
}

fn ingest_error(path: &Path, err: impl std::fmt::Display) -> RagError {
    RagError::Ingest {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// One document per data row, rendered as `header: value` lines.
pub fn load_csv(path: &Path) -> Result<Vec<Document>, RagError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ingest_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ingest_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let source = path.display().to_string();
    let mut documents = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ingest_error(path, e))?;

        if record.iter().all(|v| v.trim().is_empty()) {
            debug!(path = %source, row, "skipping blank row");
            continue;
        }

        let text = record
            .iter()
            .enumerate()
            .map(|(col, value)| {
                let name = match headers.get(col) {
                    Some(h) if !h.is_empty() => h.clone(),
                    _ => format!("column {}", col),
                };
                format!("{}: {}", name, value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");

        documents.push(Document::new(source.clone(), DocumentKind::Row, row, text));
    }

    Ok(documents)
}

/// One document per page, numbered from 1.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>, RagError> {
    let bytes = std::fs::read(path).map_err(|e| ingest_error(path, e))?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| ingest_error(path, format!("PDF extraction failed: {}", e)))?;

    let source = path.display().to_string();
    let mut documents = Vec::new();

    for (i, text) in pages.into_iter().enumerate() {
        let page = i + 1;
        if text.trim().is_empty() {
            debug!(path = %source, page, "skipping blank page");
            continue;
        }
        documents.push(Document::new(source.clone(), DocumentKind::Page, page, text));
    }

    Ok(documents)
}
