//! Output directory synchronization.
//!
//! A clean run deletes the output root and recreates it empty, so nothing
//! from a previous build survives. Incremental runs keep the tree and
//! [`prune`] away whatever the current run did not produce.
//!
//! Both are guarded by [`guard`]: clearing an output root that contains the
//! source tree (or sits inside it) would destroy inputs.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("output root {output} overlaps source root {source_root}")]
    Overlap {
        source_root: PathBuf,
        output: PathBuf,
    },
    #[error("failed to clear {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prune {path}: {source}")]
    Prune {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Refuse source/output pairs where one contains the other.
pub fn guard(source_root: &Path, output_root: &Path) -> Result<(), SyncError> {
    let source = std::path::absolute(source_root)?;
    let output = std::path::absolute(output_root)?;
    if source.starts_with(&output) || output.starts_with(&source) {
        return Err(SyncError::Overlap {
            source_root: source_root.to_path_buf(),
            output: output_root.to_path_buf(),
        });
    }
    Ok(())
}

/// Delete `output_root` and everything in it, then recreate it empty.
///
/// A missing root is not an error.
pub fn reset(output_root: &Path) -> Result<(), SyncError> {
    match fs::remove_dir_all(output_root) {
        Ok(()) => log::debug!("cleared {}", output_root.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SyncError::Clear {
                path: output_root.to_path_buf(),
                source,
            });
        }
    }
    fs::create_dir_all(output_root).map_err(|source| SyncError::Create {
        path: output_root.to_path_buf(),
        source,
    })
}

/// Remove every file under `output_root` not listed in `keep`, then any
/// directories left empty. Returns the number of files removed.
pub fn prune(output_root: &Path, keep: &HashSet<PathBuf>) -> Result<usize, SyncError> {
    if !output_root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(output_root).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if entry.depth() == 0 {
            continue;
        }
        if entry.file_type().is_dir() {
            // Fails for non-empty directories, which is what we want.
            if fs::remove_dir(path).is_ok() {
                log::debug!("pruned empty directory {}", path.display());
            }
        } else if !keep.contains(path) {
            fs::remove_file(path).map_err(|source| SyncError::Prune {
                path: path.to_path_buf(),
                source,
            })?;
            log::debug!("pruned stale output {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reset_removes_stale_files() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("dist");
        fs::create_dir_all(out.join("old/deep")).unwrap();
        fs::write(out.join("stale.txt"), "x").unwrap();
        fs::write(out.join("old/deep/a.png"), "x").unwrap();

        reset(&out).unwrap();

        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn reset_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("a/b/c");
        reset(&out).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn reset_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("dist");
        fs::write(&out, "not a dir").unwrap();
        assert!(reset(&out).is_err());
    }

    #[test]
    fn guard_rejects_same_and_nested_roots() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        assert!(guard(&src, &src).is_err());
        assert!(guard(&src, &src.join("dist")).is_err());
        assert!(guard(&src.join("images"), &src).is_err());
    }

    #[test]
    fn guard_accepts_siblings() {
        let tmp = TempDir::new().unwrap();
        assert!(guard(&tmp.path().join("src/images"), &tmp.path().join("dist/images")).is_ok());
        assert!(guard(&tmp.path().join("images"), &tmp.path().join("images2")).is_ok());
    }

    #[test]
    fn prune_keeps_listed_and_removes_the_rest() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        fs::create_dir_all(out.join("a/gone")).unwrap();
        fs::write(out.join("a/keep.avif"), "x").unwrap();
        fs::write(out.join("a/gone/old.avif"), "x").unwrap();
        fs::write(out.join("orphan.css"), "x").unwrap();

        let keep: HashSet<PathBuf> = [out.join("a/keep.avif")].into_iter().collect();
        let removed = prune(out, &keep).unwrap();

        assert_eq!(removed, 2);
        assert!(out.join("a/keep.avif").exists());
        assert!(!out.join("orphan.css").exists());
        assert!(!out.join("a/gone").exists());
    }

    #[test]
    fn prune_missing_root_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(prune(&tmp.path().join("nope"), &HashSet::new()).unwrap(), 0);
    }
}
