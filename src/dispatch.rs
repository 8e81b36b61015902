//! Transformation dispatch.
//!
//! Every discovered file is routed to exactly one [`Transformer`] by its
//! lowercased extension. Files with no route are copied through unchanged.
//!
//! A transform failure (an error or a panic) is contained to its item: it
//! is logged, the input is copied unmodified to its mirrored output path as
//! a fallback, and the item is reported as failed. The run itself carries
//! on, so every input ends up with at least one output when the fallback
//! copy succeeds.
//!
//! ```text
//! a.png  → raster   → a.avif, a.webp, a.png
//! b.xyz  → (copy)   → b.xyz
//! c.jpg  → raster ✗ → c.jpg (fallback copy, reported failed)
//! ```

use crate::cache::Fingerprint;
use crate::imaging::BackendError;
use crate::paths::{self, PathError};
use crate::svg::SvgError;
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("SVG optimization failed: {0}")]
    Svg(#[from] SvgError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSS processing failed: {0}")]
    Css(String),
    #[error("font subsetting failed: {0}")]
    Font(String),
    #[error("transform panicked: {0}")]
    Panicked(String),
}

/// One unit of work: an input file plus the roots it is mirrored between.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub input: &'a Path,
    pub source_root: &'a Path,
    pub output_root: &'a Path,
    /// Derived outputs another input owns. The transform must not write them.
    pub withheld: &'a [PathBuf],
}

impl<'a> Job<'a> {
    pub fn new(input: &'a Path, source_root: &'a Path, output_root: &'a Path) -> Self {
        Self {
            input,
            source_root,
            output_root,
            withheld: &[],
        }
    }

    pub fn withholding(self, withheld: &'a [PathBuf]) -> Self {
        Self { withheld, ..self }
    }

    /// False for an output another input owns.
    pub fn writes(&self, output: &Path) -> bool {
        !self.withheld.iter().any(|w| w == output)
    }

    /// Mirrored output path, optionally with a replaced extension.
    pub fn target(&self, extension: Option<&str>) -> Result<PathBuf, PathError> {
        paths::map_output(self.input, self.source_root, self.output_root, extension)
    }

    pub fn relative(&self) -> Result<&'a Path, PathError> {
        paths::relative(self.input, self.source_root)
    }
}

/// A file written by a transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Written {
    pub path: PathBuf,
    pub bytes: u64,
}

impl Written {
    /// Describe a file some other process already wrote.
    pub fn from_disk(path: PathBuf) -> io::Result<Self> {
        let bytes = fs::metadata(&path)?.len();
        Ok(Self { path, bytes })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written(Vec<Written>),
    /// Up to date from a previous incremental run.
    Skipped(Vec<PathBuf>),
    Failed {
        error: String,
        fallback: Option<Written>,
    },
}

/// What happened to one input.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub input: PathBuf,
    /// Input relative to the source root, for display and cache keys.
    pub relative: PathBuf,
    pub transform: &'static str,
    pub outcome: Outcome,
    pub fingerprint: Option<Fingerprint>,
}

impl TransformResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    /// Every output path this input accounts for, fallback included.
    pub fn outputs(&self) -> Vec<&Path> {
        match &self.outcome {
            Outcome::Written(written) => written.iter().map(|w| w.path.as_path()).collect(),
            Outcome::Skipped(paths) => paths.iter().map(PathBuf::as_path).collect(),
            Outcome::Failed { fallback, .. } => {
                fallback.iter().map(|w| w.path.as_path()).collect()
            }
        }
    }
}

/// A single-purpose file transformation.
pub trait Transformer: Send + Sync {
    /// Short name shown in reports ("raster", "subset", ...).
    fn name(&self) -> &'static str;

    /// Output paths `transform` would write for `job`, without touching disk.
    /// A transform with several outputs leaves out the ones `job` withholds.
    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError>;

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError>;

    /// Stable description of everything besides the input bytes that
    /// affects the output. Hashed into the build cache.
    fn params(&self) -> String {
        self.name().to_string()
    }
}

/// Name reported for unrouted files.
pub const COPY: &str = "copy";

/// Copies the input byte-for-byte to its mirrored path.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyThrough;

impl Transformer for CopyThrough {
    fn name(&self) -> &'static str {
        COPY
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        Ok(vec![job.target(None)?])
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        Ok(vec![copy_through(job)?])
    }
}

/// Copy `job.input` to its mirrored output path, creating parents.
pub fn copy_through(job: &Job) -> Result<Written, TransformError> {
    let target = job.target(None)?;
    ensure_parent(&target)?;
    let bytes = fs::copy(job.input, &target)?;
    Ok(Written {
        path: target,
        bytes,
    })
}

/// Write `data` to `path`, creating parents.
pub fn write_output(path: &Path, data: &[u8]) -> io::Result<Written> {
    ensure_parent(path)?;
    fs::write(path, data)?;
    Ok(Written {
        path: path.to_path_buf(),
        bytes: data.len() as u64,
    })
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

struct Route {
    extensions: Vec<String>,
    transformer: Box<dyn Transformer>,
}

/// Extension-based routing table.
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<Route>,
    copy: CopyThrough,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route files with any of `extensions` (case-insensitive, no dot) to
    /// `transformer`. Earlier routes win when extensions overlap.
    pub fn route(mut self, extensions: &[&str], transformer: impl Transformer + 'static) -> Self {
        self.routes.push(Route {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            transformer: Box::new(transformer),
        });
        self
    }

    /// The transformer responsible for `path`.
    pub fn select(&self, path: &Path) -> &dyn Transformer {
        let Some(ext) = paths::extension_of(path) else {
            return &self.copy;
        };
        self.routes
            .iter()
            .find(|r| r.extensions.iter().any(|e| *e == ext))
            .map(|r| r.transformer.as_ref())
            .unwrap_or(&self.copy)
    }

    /// The transformer for `job`. Falls back to a plain copy when every
    /// output the routed transformer would write is withheld.
    pub fn select_for(&self, job: &Job) -> &dyn Transformer {
        let transformer = self.select(job.input);
        if job.withheld.is_empty() {
            return transformer;
        }
        match transformer.plan(job) {
            Ok(outputs) if outputs.iter().all(|o| !job.writes(o)) => &self.copy,
            _ => transformer,
        }
    }

    /// Transform one input, containing any failure to this item.
    pub fn dispatch(&self, job: &Job) -> TransformResult {
        let transformer = self.select_for(job);
        let relative = job
            .relative()
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| job.input.to_path_buf());

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| transformer.transform(job)))
            .unwrap_or_else(|payload| Err(TransformError::Panicked(panic_message(&*payload))));

        let outcome = match attempt {
            Ok(written) => {
                log::debug!(
                    "{}: {} wrote {} file(s)",
                    relative.display(),
                    transformer.name(),
                    written.len()
                );
                Outcome::Written(written)
            }
            Err(err) => {
                log::error!("{}: {} failed: {}", relative.display(), transformer.name(), err);
                let fallback = if transformer.name() == COPY {
                    None
                } else {
                    match copy_through(job) {
                        Ok(written) => {
                            log::warn!(
                                "{}: copied unmodified to {}",
                                relative.display(),
                                written.path.display()
                            );
                            Some(written)
                        }
                        Err(copy_err) => {
                            log::error!(
                                "{}: fallback copy failed: {}",
                                relative.display(),
                                copy_err
                            );
                            None
                        }
                    }
                };
                Outcome::Failed {
                    error: err.to_string(),
                    fallback,
                }
            }
        };

        TransformResult {
            input: job.input.to_path_buf(),
            relative,
            transform: transformer.name(),
            outcome,
            fingerprint: None,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Transformer that always fails, for exercising the fallback path.
    pub struct Failing;

    impl Transformer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
            Ok(vec![job.target(Some("out"))?])
        }

        fn transform(&self, _job: &Job) -> Result<Vec<Written>, TransformError> {
            Err(TransformError::Css("unexpected token".into()))
        }
    }

    struct Panicking;

    impl Transformer for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn plan(&self, _job: &Job) -> Result<Vec<PathBuf>, PathError> {
            Ok(Vec::new())
        }

        fn transform(&self, _job: &Job) -> Result<Vec<Written>, TransformError> {
            panic!("decoder exploded")
        }
    }

    struct Upper;

    impl Transformer for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
            Ok(vec![job.target(None)?])
        }

        fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
            let text = fs::read_to_string(job.input)?;
            Ok(vec![write_output(
                &job.target(None)?,
                text.to_uppercase().as_bytes(),
            )?])
        }
    }

    fn setup(name: &str, content: &str) -> (TempDir, PathBuf, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        fs::create_dir_all(src.join("nested")).unwrap();
        let input = src.join("nested").join(name);
        fs::write(&input, content).unwrap();
        (tmp, src, out, input)
    }

    #[test]
    fn routes_by_lowercased_extension() {
        let dispatcher = Dispatcher::new().route(&["txt"], Upper);
        assert_eq!(dispatcher.select(Path::new("a/B.TXT")).name(), "upper");
        assert_eq!(dispatcher.select(Path::new("a/b.xyz")).name(), COPY);
        assert_eq!(dispatcher.select(Path::new("a/Makefile")).name(), COPY);
    }

    #[test]
    fn first_matching_route_wins() {
        let dispatcher = Dispatcher::new()
            .route(&["txt"], Upper)
            .route(&["txt"], Failing);
        assert_eq!(dispatcher.select(Path::new("a.txt")).name(), "upper");
    }

    #[test]
    fn successful_transform_writes_mirrored_output() {
        let (_tmp, src, out, input) = setup("a.txt", "hello");
        let dispatcher = Dispatcher::new().route(&["txt"], Upper);

        let result = dispatcher.dispatch(&Job::new(&input, &src, &out));

        assert_eq!(result.transform, "upper");
        assert_eq!(result.relative, PathBuf::from("nested/a.txt"));
        assert!(!result.is_failure());
        assert_eq!(fs::read_to_string(out.join("nested/a.txt")).unwrap(), "HELLO");
    }

    #[test]
    fn unknown_extension_is_copied_verbatim() {
        let (_tmp, src, out, input) = setup("b.xyz", "raw bytes");
        let result = Dispatcher::new().dispatch(&Job::new(&input, &src, &out));

        assert_eq!(result.transform, COPY);
        assert_eq!(fs::read_to_string(out.join("nested/b.xyz")).unwrap(), "raw bytes");
    }

    #[test]
    fn failure_falls_back_to_copy() {
        let (_tmp, src, out, input) = setup("c.css", "a{");
        let dispatcher = Dispatcher::new().route(&["css"], Failing);

        let result = dispatcher.dispatch(&Job::new(&input, &src, &out));

        match &result.outcome {
            Outcome::Failed { error, fallback } => {
                assert!(error.contains("unexpected token"));
                assert_eq!(fallback.as_ref().unwrap().path, out.join("nested/c.css"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(out.join("nested/c.css")).unwrap(), "a{");
        assert_eq!(result.outputs(), vec![out.join("nested/c.css").as_path()]);
    }

    #[test]
    fn fully_withheld_job_is_copied_unchanged() {
        let (_tmp, src, out, input) = setup("Inter.ttf", "glyphs");
        let dispatcher = Dispatcher::new().route(&["ttf"], Failing);
        let withheld = vec![out.join("nested/Inter.out")];
        let job = Job::new(&input, &src, &out).withholding(&withheld);

        assert_eq!(dispatcher.select_for(&job).name(), COPY);
        let result = dispatcher.dispatch(&job);

        assert!(!result.is_failure());
        assert_eq!(fs::read_to_string(out.join("nested/Inter.ttf")).unwrap(), "glyphs");
        assert!(!out.join("nested/Inter.out").exists());
    }

    #[test]
    fn unrelated_withheld_output_keeps_the_route() {
        let (_tmp, src, out, input) = setup("a.txt", "x");
        let dispatcher = Dispatcher::new().route(&["txt"], Upper);
        let withheld = vec![out.join("nested/a.webp")];
        let job = Job::new(&input, &src, &out).withholding(&withheld);
        assert_eq!(dispatcher.select_for(&job).name(), "upper");
    }

    #[test]
    fn panic_is_contained() {
        let (_tmp, src, out, input) = setup("d.png", "not really a png");
        let dispatcher = Dispatcher::new().route(&["png"], Panicking);

        let result = dispatcher.dispatch(&Job::new(&input, &src, &out));

        match &result.outcome {
            Outcome::Failed { error, fallback } => {
                assert!(error.contains("decoder exploded"));
                assert!(fallback.is_some());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn failed_copy_has_no_fallback() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        let input = src.join("vanished.bin");

        let result = Dispatcher::new().dispatch(&Job::new(&input, &src, &out));

        assert!(matches!(
            result.outcome,
            Outcome::Failed { fallback: None, .. }
        ));
        assert!(result.outputs().is_empty());
    }
}
