//! Corpus directory scanner.
//!
//! Walks the corpus root and returns every file that matches the include
//! globs, addressed by its path relative to the root. Bytes are not read
//! here; the coordinator reads each file so a single unreadable file is a
//! per-document failure rather than a scan failure.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use ragrag_core::models::DocKind;

use crate::config::CorpusConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the corpus root, `/`-separated.
    pub source_id: String,
    pub kind: DocKind,
}

/// Scan `root` using the include/exclude rules from `config`.
///
/// `skip_dirs` are additional directories to leave out when they sit
/// inside `root` (the upgrade papers directory).
pub fn scan_corpus(root: &Path, config: &CorpusConfig, skip_dirs: &[PathBuf]) -> Result<Vec<CorpusFile>> {
    if !root.is_dir() {
        bail!("Corpus root is not a readable directory: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    for dir in skip_dirs {
        if let Some(rel) = relative_to(dir, root) {
            if !rel.is_empty() {
                excludes.push(format!("{}/**", rel));
            }
        }
    }
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("Failed to read corpus root: {}", root.display()));
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = to_source_id(relative);

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        let Some(kind) = DocKind::from_path(path) else {
            warn!(source_id = %rel_str, "included file has an unsupported extension, skipping");
            continue;
        };

        files.push(CorpusFile {
            path: path.to_path_buf(),
            source_id: rel_str,
            kind,
        });
    }

    files.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(files)
}

/// Source id for a single file: relative to `root` when inside it,
/// otherwise the path as given.
pub fn source_id_for(path: &Path, root: &Path) -> String {
    relative_to(path, root).unwrap_or_else(|| to_source_id(path))
}

fn to_source_id(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `root`, comparing canonical forms when both exist.
fn relative_to(path: &Path, root: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_source_id(rel));
    }
    let path = path.canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(to_source_id)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
