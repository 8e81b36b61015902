//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Raster re-encode** | `image` decoders + AVIF (rav1e), WebP, JPEG, PNG encoders |
//! | **EXIF rotation** | `ImageDecoder::orientation` |
//! | **SVG → PNG** | `resvg` with contain-fit placement |
//! | **ICO** | `image::codecs::ico` with PNG frames |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for placement math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{Fit, contain_fit};
pub use operations::{RasterPlan, RasterSettings, create_variants, plan_raster};
pub use params::{EncodeParams, EncodeTarget, OutputFormat, Quality};
pub use rust_backend::{RustBackend, encode_png, pack_ico, rasterize_svg};
