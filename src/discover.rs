//! Source tree discovery.
//!
//! Produces the complete work list for a pipeline run before any work
//! starts. The walk is recursive, does not follow symlinks, and yields
//! regular files only, in a stable sorted order so repeated runs see the
//! same list.
//!
//! Hidden entries (names starting with `.`) are skipped unless the filter
//! opts in. A hidden directory prunes its whole subtree.

use crate::paths::extension_of;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("source root {path} is not readable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Which files make it into the work list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Lowercase extensions without the dot. Empty accepts every file.
    pub extensions: Vec<String>,
    pub include_hidden: bool,
}

impl Filter {
    /// Accept every regular, non-hidden file.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_extensions(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            include_hidden: false,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match extension_of(path) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

/// Enumerate every file under `root` accepted by `filter`.
///
/// An unreadable root, or any error mid-walk, fails the whole discovery.
/// Partial work lists are never returned.
pub fn discover(root: &Path, filter: &Filter) -> Result<Vec<PathBuf>, DiscoverError> {
    let meta = fs::metadata(root).map_err(|source| DiscoverError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(DiscoverError::NotADirectory(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| filter.include_hidden || e.depth() == 0 || !is_hidden(e));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && filter.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    log::debug!("discovered {} files under {}", files.len(), root.display());
    Ok(files)
}
