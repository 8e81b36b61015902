//! Build cache for incremental runs.
//!
//! AVIF encoding and font subsetting dominate build time. With
//! `--incremental`, an input whose content and transform parameters are
//! unchanged since the last run is skipped, provided every output it
//! produced last time is still on disk.
//!
//! # Design
//!
//! Entries are keyed by the input's path relative to the source root and
//! carry a [`Fingerprint`]:
//!
//! - **`source_hash`**: SHA-256 of the input file contents. Content-based
//!   rather than mtime-based so it survives `git checkout`, which resets
//!   modification times.
//! - **`params_hash`**: SHA-256 of the transform's parameter description
//!   (see [`Transformer::params`](crate::dispatch::Transformer::params)).
//!   Changing a quality setting or the unicode subset invalidates every
//!   entry the transform produced.
//!
//! Failed items are never recorded, so they are retried on the next run.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_root>/.webprep-cache.json`. It
//! lives alongside the outputs so it travels with the output directory
//! when cached in CI. Clean runs neither read nor write it. Entries are kept in a sorted map so two identical
//! runs write byte-identical manifests.

use crate::dispatch::{Outcome, TransformResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache manifest file within the output root.
pub const MANIFEST_FILENAME: &str = ".webprep-cache.json";

/// Bump to invalidate every existing cache when the format or key
/// computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Content and parameter hashes identifying one transform invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub source_hash: String,
    pub params_hash: String,
}

impl Fingerprint {
    pub fn compute(input: &Path, params: &str) -> io::Result<Self> {
        Ok(Self {
            source_hash: hash_file(input)?,
            params_hash: hash_params(params),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    /// Outputs relative to the output root.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheManifest {
    /// An empty manifest (clean runs, first build).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(output_root: &Path) -> PathBuf {
        output_root.join(MANIFEST_FILENAME)
    }

    /// Load from the output root. A missing, corrupt, or outdated manifest
    /// yields an empty one.
    pub fn load(output_root: &Path) -> Self {
        let content = match std::fs::read_to_string(Self::path(output_root)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ignoring unreadable build cache: {e}");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            log::debug!(
                "build cache version {} != {}, starting fresh",
                manifest.version,
                MANIFEST_VERSION
            );
            return Self::empty();
        }
        manifest
    }

    pub fn save(&self, output_root: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(output_root), json + "\n")
    }

    /// Outputs of a previous identical transform, if all still exist.
    pub fn find_fresh(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        output_root: &Path,
    ) -> Option<Vec<PathBuf>> {
        let entry = self.entries.get(key)?;
        if entry.fingerprint != *fingerprint {
            return None;
        }
        let outputs: Vec<PathBuf> = entry.outputs.iter().map(|o| output_root.join(o)).collect();
        outputs.iter().all(|o| o.is_file()).then_some(outputs)
    }

    pub fn insert(&mut self, key: String, fingerprint: Fingerprint, outputs: Vec<String>) {
        self.entries.insert(
            key,
            CacheEntry {
                fingerprint,
                outputs,
            },
        );
    }

    /// Build the manifest describing a finished run.
    ///
    /// Written and skipped results are recorded; failures are not.
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a TransformResult>,
        output_root: &Path,
    ) -> Self {
        let mut manifest = Self::empty();
        for result in results {
            let Some(fingerprint) = &result.fingerprint else {
                continue;
            };
            let outputs: Vec<PathBuf> = match &result.outcome {
                Outcome::Written(written) => written.iter().map(|w| w.path.clone()).collect(),
                Outcome::Skipped(paths) => paths.clone(),
                Outcome::Failed { .. } => continue,
            };
            let outputs = outputs
                .iter()
                .filter_map(|p| p.strip_prefix(output_root).ok())
                .map(cache_key)
                .collect();
            manifest.insert(cache_key(&result.relative), fingerprint.clone(), outputs);
        }
        manifest
    }
}

/// Normalized manifest key for a relative path.
pub fn cache_key(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of a transform's parameter description.
pub fn hash_params(params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"params\0");
    hasher.update(params.as_bytes());
    format!("{:x}", hasher.finalize())
}
