//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what files to create) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`OutputFormat`]: Target codec plus its settings.
//! - [`EncodeTarget`]: One output file and the format to write it in.
//! - [`EncodeParams`]: A source image and every target it fans out to.

use std::fmt;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// rav1e via the `image` crate; speed 1 (slowest) to 10 (fastest).
    Avif { quality: Quality, speed: u8 },
    /// The pure-Rust WebP encoder is lossless only.
    WebpLossless,
    Jpeg { quality: Quality },
    /// Best compression, adaptive filtering.
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Avif { .. } => "avif",
            OutputFormat::WebpLossless => "webp",
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Whether the encoder can store an alpha channel.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, OutputFormat::Jpeg { .. })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Avif { quality, speed } => {
                write!(f, "avif(q={},s={})", quality.value(), speed)
            }
            OutputFormat::WebpLossless => write!(f, "webp(lossless)"),
            OutputFormat::Jpeg { quality } => write!(f, "jpeg(q={})", quality.value()),
            OutputFormat::Png => write!(f, "png(best)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub output: PathBuf,
    pub format: OutputFormat,
}

/// Decode `source` once, then write every target.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub source: PathBuf,
    pub targets: Vec<EncodeTarget>,
}
