//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

/// Placement of a source drawing inside a square canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Scale `source` to fit entirely inside a `size`×`size` canvas, preserving
/// aspect ratio, centered on the short axis ("contain": no cropping).
///
/// # Arguments
/// * `source` - Drawing dimensions (width, height); non-positive values
///   are treated as 1
/// * `size` - Canvas edge in pixels
///
/// # Examples
/// ```
/// # use webprep::imaging::contain_fit;
/// // A 200×100 logo in a 32px icon: scale 0.16, 8px bands top and bottom.
/// let fit = contain_fit((200.0, 100.0), 32);
/// assert!((fit.scale - 0.16).abs() < 1e-6);
/// assert!(fit.offset_x.abs() < 1e-4 && (fit.offset_y - 8.0).abs() < 1e-4);
/// ```
pub fn contain_fit(source: (f32, f32), size: u32) -> Fit {
    let (src_w, src_h) = (positive(source.0), positive(source.1));
    let canvas = size as f32;
    let scale = (canvas / src_w).min(canvas / src_h);
    Fit {
        scale,
        offset_x: (canvas - src_w * scale) / 2.0,
        offset_y: (canvas - src_h * scale) / 2.0,
    }
}

fn positive(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 { v } else { 1.0 }
}
