//! Scans the documents directory and loads every supported file.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract;
use crate::models::Document;

/// Outcome of loading the documents directory.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub documents: Vec<Document>,
    /// Files with an extension we do not extract.
    pub unsupported: Vec<PathBuf>,
    /// Files whose extraction failed or produced no text.
    pub failed: Vec<PathBuf>,
}

/// Fails unless `root` is an existing directory.
pub fn ensure_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("Documents directory does not exist: {}", root.display());
    }
    Ok(())
}

/// Lists regular files directly under `root`, sorted by name.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    ensure_root(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

/// The identifier stored with every chunk of `path`: its URL-decoded file name.
pub fn source_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match urlencoding::decode(&file_name) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => file_name,
    }
}

/// Loads every supported file under `root`.
///
/// A missing root is fatal; a single unreadable or unsupported file is logged
/// and skipped.
pub fn scan_documents(root: &Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();

    for path in list_files(root)? {
        match extract::load_document(&path) {
            Ok(Some(text)) if !text.trim().is_empty() => {
                result.documents.push(Document {
                    text,
                    source: source_name(&path),
                });
            }
            Ok(Some(_)) => {
                tracing::warn!(path = %path.display(), "skipping file with no text");
                result.failed.push(path);
            }
            Ok(None) => {
                tracing::warn!(path = %path.display(), "skipping unsupported file type");
                result.unsupported.push(path);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file");
                result.failed.push(path);
            }
        }
    }

    Ok(result)
}
