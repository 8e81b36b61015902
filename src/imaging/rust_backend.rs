//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image` crate (pure Rust decoders) |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (best compression) |
//! | Rasterize SVG | `resvg` + `tiny-skia` |
//! | Pack ICO | `image::codecs::ico::IcoEncoder` (PNG frames) |
//!
//! Pixels are decoded into memory and re-encoded from scratch, so EXIF,
//! ICC and XMP blocks from the source never reach the outputs.

use super::backend::{BackendError, ImageBackend};
use super::calculations::contain_fit;
use super::params::{EncodeParams, EncodeTarget, OutputFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageReader, Rgba, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an image and rotate/flip it upright according to its EXIF tag.
fn load_oriented(path: &Path) -> Result<DynamicImage, BackendError> {
    let failed = |e: image::ImageError| {
        BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
    };
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(failed)?;
    let orientation = decoder.orientation().map_err(failed)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(failed)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Convert to the 8-bit layout the encoder accepts.
fn normalize(img: &DynamicImage, format: OutputFormat) -> DynamicImage {
    if img.color().has_alpha() && format.supports_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

fn save(img: &DynamicImage, target: &EncodeTarget) -> Result<u64, BackendError> {
    if let Some(parent) = target.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pixels = normalize(img, target.format);
    let writer = BufWriter::new(File::create(&target.output)?);
    let encoded = match target.format {
        OutputFormat::Avif { quality, speed } => pixels.write_with_encoder(
            AvifEncoder::new_with_speed_quality(writer, speed, quality.value() as u8),
        ),
        OutputFormat::WebpLossless => pixels.write_with_encoder(WebPEncoder::new_lossless(writer)),
        OutputFormat::Jpeg { quality } => {
            pixels.write_with_encoder(JpegEncoder::new_with_quality(writer, quality.value() as u8))
        }
        OutputFormat::Png => pixels.write_with_encoder(PngEncoder::new_with_quality(
            writer,
            CompressionType::Best,
            PngFilter::Adaptive,
        )),
    };
    encoded.map_err(|e| {
        BackendError::ProcessingFailed(format!(
            "{} encode of {} failed: {}",
            target.format,
            target.output.display(),
            e
        ))
    })?;
    Ok(std::fs::metadata(&target.output)?.len())
}

impl ImageBackend for RustBackend {
    fn encode(&self, params: &EncodeParams) -> Result<Vec<u64>, BackendError> {
        let img = load_oriented(&params.source)?;
        params.targets.iter().map(|t| save(&img, t)).collect()
    }
}

/// Render SVG markup into a `size`×`size` RGBA image.
///
/// The drawing is scaled to fit and centered ("contain"). With
/// `background`, the canvas is filled with that opaque color first;
/// otherwise it stays transparent.
pub fn rasterize_svg(
    svg: &str,
    size: u32,
    background: Option<[u8; 3]>,
) -> Result<RgbaImage, BackendError> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse SVG: {e}")))?;
    let mut pixmap = tiny_skia::Pixmap::new(size, size).ok_or_else(|| {
        BackendError::ProcessingFailed(format!("Cannot allocate a {size}x{size} canvas"))
    })?;
    if let Some([r, g, b]) = background {
        pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, 255));
    }

    let fit = contain_fit((tree.size().width(), tree.size().height()), size);
    let transform = tiny_skia::Transform::from_row(
        fit.scale,
        0.0,
        0.0,
        fit.scale,
        fit.offset_x,
        fit.offset_y,
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut img = RgbaImage::new(size, size);
    for (out, px) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = px.demultiply();
        *out = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(img)
}

/// Encode an RGBA image as PNG at best compression.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

/// Pack RGBA images into one ICO file, each frame stored as PNG.
pub fn pack_ico(frames: &[RgbaImage]) -> Result<Vec<u8>, BackendError> {
    let failed = |e: image::ImageError| BackendError::ProcessingFailed(format!("ICO encode failed: {e}"));
    let frames = frames
        .iter()
        .map(|img| IcoFrame::as_png(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8))
        .collect::<Result<Vec<_>, _>>()
        .map_err(failed)?;
    let mut buf = Vec::new();
    IcoEncoder::new(&mut buf).encode_images(&frames).map_err(failed)?;
    Ok(buf)
}
