//! Snapshot visualization: Gaussian means drawn as dots over the prediction.

use crate::core::Raster;
use image::{Rgb, RgbImage};
use nalgebra::Vector2;

/// Dot color for Gaussian centers.
pub const POINT_COLOR: [u8; 3] = [255, 48, 48];

/// Quantize an intensity in `[0, 1]` to a byte. Out-of-range values saturate, NaN maps to 0.
pub fn intensity_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Draw each mean as a filled disc of `radius_px` on top of the grayscale `base`.
///
/// Means are rounded to the nearest pixel; dots falling outside the image
/// (or with non-finite coordinates) are clipped.
pub fn overlay_points(base: &Raster, points: &[Vector2<f32>], radius_px: i32) -> RgbImage {
    let width = base.width() as i32;
    let height = base.height() as i32;

    let mut out = RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let v = intensity_to_u8(base.get(x, y));
        Rgb([v, v, v])
    });

    for p in points {
        if !(p.x.is_finite() && p.y.is_finite()) {
            continue;
        }
        let cx = p.x.round() as i32;
        let cy = p.y.round() as i32;

        for dy in -radius_px..=radius_px {
            for dx in -radius_px..=radius_px {
                let x = cx + dx;
                let y = cy + dy;
                if x < 0 || x >= width || y < 0 || y >= height {
                    continue;
                }
                if dx * dx + dy * dy > radius_px * radius_px {
                    continue;
                }
                out.put_pixel(x as u32, y as u32, Rgb(POINT_COLOR));
            }
        }
    }
    out
}
