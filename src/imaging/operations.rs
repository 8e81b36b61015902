//! High-level image operations.
//!
//! Decides which files a raster input fans out to and hands the pixel work
//! to an [`ImageBackend`]. Planning is pure; only [`create_variants`]
//! touches the backend.
//!
//! ```text
//! team/a.png  →  team/a.avif   (AVIF, lossy)
//!             →  team/a.webp   (WebP, lossless)
//!             →  team/a.png    (PNG, best compression)
//! ```

use super::backend::ImageBackend;
use super::params::{EncodeParams, EncodeTarget, OutputFormat, Quality};
use crate::config::ImagesConfig;
use crate::dispatch::{Job, TransformError, Written, copy_through};
use crate::paths::{PathError, extension_of};

/// Encode settings for raster inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSettings {
    /// `None` disables the AVIF sibling.
    pub avif: Option<(Quality, u8)>,
    pub webp: bool,
    /// `None` copies JPEG originals unchanged.
    pub jpeg: Option<Quality>,
    /// False copies PNG originals unchanged.
    pub png: bool,
}

impl RasterSettings {
    pub fn from_config(config: &ImagesConfig) -> Self {
        Self {
            avif: config
                .avif
                .enabled
                .then(|| (Quality::new(config.avif.quality), config.avif.speed)),
            webp: config.webp.enabled,
            jpeg: config.jpeg.enabled.then(|| Quality::new(config.jpeg.quality)),
            png: config.png.enabled,
        }
    }

    /// Stable description for cache keys.
    pub fn describe(&self) -> String {
        format!(
            "avif={:?};webp={};jpeg={:?};png={}",
            self.avif.map(|(q, s)| (q.value(), s)),
            self.webp,
            self.jpeg.map(Quality::value),
            self.png
        )
    }

    /// Format used to re-encode an original with this extension, if any.
    fn original_format(&self, extension: &str) -> Option<OutputFormat> {
        match extension {
            "jpg" | "jpeg" => self.jpeg.map(|quality| OutputFormat::Jpeg { quality }),
            "png" => self.png.then_some(OutputFormat::Png),
            _ => None,
        }
    }
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self::from_config(&ImagesConfig::default())
    }
}

/// The files written for one raster input.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPlan {
    /// Re-encoded siblings and, when enabled, the re-encoded original.
    pub encode: EncodeParams,
    /// Original copied verbatim because re-encoding it is disabled.
    pub copy_original: bool,
}

/// Compute every output for a raster input, minus the ones `job`
/// withholds. Pure.
pub fn plan_raster(job: &Job, settings: &RasterSettings) -> Result<RasterPlan, PathError> {
    let extension = extension_of(job.input).unwrap_or_default();
    let mut targets = Vec::new();
    if let Some((quality, speed)) = settings.avif {
        targets.push(EncodeTarget {
            output: job.target(Some("avif"))?,
            format: OutputFormat::Avif { quality, speed },
        });
    }
    if settings.webp {
        targets.push(EncodeTarget {
            output: job.target(Some("webp"))?,
            format: OutputFormat::WebpLossless,
        });
    }
    let original = settings.original_format(&extension);
    if let Some(format) = original {
        targets.push(EncodeTarget {
            output: job.target(None)?,
            format,
        });
    }
    targets.retain(|t| job.writes(&t.output));
    Ok(RasterPlan {
        encode: EncodeParams {
            source: job.input.to_path_buf(),
            targets,
        },
        copy_original: original.is_none(),
    })
}

/// Write every planned output for a raster input.
pub fn create_variants(
    backend: &impl ImageBackend,
    job: &Job,
    settings: &RasterSettings,
) -> Result<Vec<Written>, TransformError> {
    let plan = plan_raster(job, settings)?;
    let mut written = Vec::with_capacity(plan.encode.targets.len() + 1);
    if !plan.encode.targets.is_empty() {
        let sizes = backend.encode(&plan.encode)?;
        written.extend(
            plan.encode
                .targets
                .iter()
                .zip(sizes)
                .map(|(t, bytes)| Written {
                    path: t.output.clone(),
                    bytes,
                }),
        );
    }
    if plan.copy_original {
        written.push(copy_through(job)?);
    }
    Ok(written)
}
