//! The parameterized asset pipeline.
//!
//! Every file-based asset family is one instance of the same run:
//!
//! ```text
//! guard roots
//!   → discover work list       (or explicit entries)
//!   → settle shared outputs    (each output path gets one owner)
//!   → reset output root        (clean run)  | load build cache   (incremental)
//!   → worker pool: per item    cache hit → skipped | dispatch → written / failed
//!   → save build cache, prune stale outputs   (incremental only)
//! ```
//!
//! Everything before the pool is setup: any error there aborts the run
//! before a single item is touched. Once the pool starts, per-item
//! failures are results, never errors, and the run always completes.
//!
//! Two inputs may plan the same output, e.g. `hero.png` derives a
//! `hero.webp` next to a shipped `hero.webp`. The input whose mirrored path
//! it is owns it; otherwise the first input in work-list order does. The
//! other input skips that output, and is copied through unchanged when it
//! has nothing left to write.

use crate::cache::{CacheManifest, Fingerprint, cache_key};
use crate::discover::{self, DiscoverError, Filter};
use crate::dispatch::{Dispatcher, Job, Outcome, TransformResult};
use crate::paths::PathError;
use crate::pool::{self, PoolError};
use crate::sync::{self, SyncError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("entry {0} does not exist")]
    MissingEntry(PathBuf),
    #[error("failed to save build cache: {0}")]
    Cache(#[source] io::Error),
}

/// Everything one run needs besides the dispatcher. Fixed for the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Family name for reports ("images").
    pub family: &'static str,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub filter: Filter,
    /// Explicit inputs relative to the source root. Empty discovers.
    pub entries: Vec<PathBuf>,
    pub concurrency: usize,
    pub incremental: bool,
}

impl RunConfig {
    /// Clean run over everything under `source_root`.
    pub fn new(
        family: &'static str,
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            family,
            source_root: source_root.into(),
            output_root: output_root.into(),
            filter: Filter::all(),
            entries: Vec::new(),
            concurrency: 8,
            incremental: false,
        }
    }
}

/// Progress sent to an optional listener while a run is in flight.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        family: &'static str,
        items: usize,
        workers: usize,
    },
    Item(TransformResult),
}

/// Aggregate of one run, keyed by input path.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub family: &'static str,
    pub results: BTreeMap<PathBuf, TransformResult>,
}

/// Counters derived from a [`BatchReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub transformed: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Failed items whose input was copied through unmodified.
    pub fallbacks: usize,
    pub bytes_written: u64,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.transformed + self.copied + self.skipped + self.failed
    }
}

impl BatchReport {
    pub fn new(family: &'static str, results: impl IntoIterator<Item = TransformResult>) -> Self {
        Self {
            family,
            results: results.into_iter().map(|r| (r.input.clone(), r)).collect(),
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in self.results.values() {
            match &result.outcome {
                Outcome::Written(written) => {
                    if result.transform == crate::dispatch::COPY {
                        summary.copied += 1;
                    } else {
                        summary.transformed += 1;
                    }
                    summary.bytes_written += written.iter().map(|w| w.bytes).sum::<u64>();
                }
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed { fallback, .. } => {
                    summary.failed += 1;
                    if let Some(w) = fallback {
                        summary.fallbacks += 1;
                        summary.bytes_written += w.bytes;
                    }
                }
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransformResult> {
        self.results.values().filter(|r| r.is_failure())
    }

    /// Every output path the run produced or confirmed.
    pub fn outputs(&self) -> HashSet<PathBuf> {
        self.results
            .values()
            .flat_map(|r| r.outputs())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Build the work list: explicit entries, or discovery.
pub fn work_list(config: &RunConfig) -> Result<Vec<PathBuf>, PipelineError> {
    if config.entries.is_empty() {
        return Ok(discover::discover(&config.source_root, &config.filter)?);
    }
    config
        .entries
        .iter()
        .map(|entry| {
            let path = config.source_root.join(entry);
            if path.is_file() {
                Ok(path)
            } else {
                Err(PipelineError::MissingEntry(path))
            }
        })
        .collect()
}

/// Outputs each input must leave to another input, keyed by input.
///
/// Mirroring keeps distinct inputs apart, but an extension override can
/// map `a.png` and `a.jpg` onto the same `a.avif`, or `hero.png` onto a
/// shipped `hero.webp`.
pub fn withheld_outputs(
    items: &[PathBuf],
    config: &RunConfig,
    dispatcher: &Dispatcher,
) -> Result<HashMap<PathBuf, Vec<PathBuf>>, PipelineError> {
    let mut claims: BTreeMap<PathBuf, Vec<&Path>> = BTreeMap::new();
    for input in items {
        let job = Job::new(input, &config.source_root, &config.output_root);
        for output in dispatcher.select(input).plan(&job)? {
            claims.entry(output).or_default().push(input.as_path());
        }
    }

    let mut withheld: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
    for (output, claimants) in claims.into_iter().filter(|(_, c)| c.len() > 1) {
        let mut owner = claimants[0];
        for &input in &claimants {
            let job = Job::new(input, &config.source_root, &config.output_root);
            if job.target(None)? == output {
                owner = input;
            }
        }
        for &input in claimants.iter().filter(|&&i| i != owner) {
            log::warn!(
                "{}: not writing {}, it belongs to {}",
                input.display(),
                output.display(),
                owner.display()
            );
            withheld
                .entry(input.to_path_buf())
                .or_default()
                .push(output.clone());
        }
    }
    Ok(withheld)
}

/// Run one asset family end to end.
pub fn run(
    config: &RunConfig,
    dispatcher: &Dispatcher,
    events: Option<Sender<PipelineEvent>>,
) -> Result<BatchReport, PipelineError> {
    sync::guard(&config.source_root, &config.output_root)?;
    let items = work_list(config)?;
    let withheld = withheld_outputs(&items, config, dispatcher)?;

    let previous = if config.incremental {
        CacheManifest::load(&config.output_root)
    } else {
        sync::reset(&config.output_root)?;
        CacheManifest::empty()
    };

    let workers = pool::effective_workers(config.concurrency, items.len());
    log::info!(
        "{}: {} item(s) from {} with {} worker(s)",
        config.family,
        items.len(),
        config.source_root.display(),
        workers
    );
    if let Some(tx) = &events {
        tx.send(PipelineEvent::Started {
            family: config.family,
            items: items.len(),
            workers,
        })
        .ok();
    }

    let results = pool::run(&items, config.concurrency, |input| {
        let skip = withheld.get(input).map(Vec::as_slice).unwrap_or(&[]);
        let result = process_item(input, skip, config, dispatcher, &previous);
        if let Some(tx) = &events {
            tx.send(PipelineEvent::Item(result.clone())).ok();
        }
        result
    })?;

    let report = BatchReport::new(config.family, results);
    if config.incremental {
        let manifest = CacheManifest::from_results(report.results.values(), &config.output_root);
        std::fs::create_dir_all(&config.output_root).map_err(PipelineError::Cache)?;
        manifest
            .save(&config.output_root)
            .map_err(PipelineError::Cache)?;

        let mut keep = report.outputs();
        keep.insert(CacheManifest::path(&config.output_root));
        let removed = sync::prune(&config.output_root, &keep)?;
        if removed > 0 {
            log::info!("{}: pruned {} stale output(s)", config.family, removed);
        }
    }
    Ok(report)
}

fn process_item(
    input: &Path,
    withheld: &[PathBuf],
    config: &RunConfig,
    dispatcher: &Dispatcher,
    previous: &CacheManifest,
) -> TransformResult {
    let job = Job::new(input, &config.source_root, &config.output_root).withholding(withheld);
    let transformer = dispatcher.select_for(&job);
    let fingerprint = if config.incremental {
        fingerprint(input, transformer.params(), withheld)
    } else {
        None
    };

    if let Some(fp) = &fingerprint
        && let Ok(rel) = job.relative()
        && let Some(outputs) = previous.find_fresh(&cache_key(rel), fp, &config.output_root)
    {
        log::debug!("{}: up to date", rel.display());
        return TransformResult {
            input: input.to_path_buf(),
            relative: rel.to_path_buf(),
            transform: transformer.name(),
            outcome: Outcome::Skipped(outputs),
            fingerprint,
        };
    }

    let mut result = dispatcher.dispatch(&job);
    result.fingerprint = fingerprint;
    result
}

/// Withheld outputs are part of the parameters: a sibling appearing or
/// disappearing changes what the input writes.
fn fingerprint(input: &Path, mut params: String, withheld: &[PathBuf]) -> Option<Fingerprint> {
    for path in withheld {
        params.push_str(&format!("|without:{}", path.display()));
    }
    match Fingerprint::compute(input, &params) {
        Ok(fp) => Some(fp),
        Err(e) => {
            log::debug!("{}: cannot fingerprint: {}", input.display(), e);
            None
        }
    }
}
