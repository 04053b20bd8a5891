//! Image ingestion and snapshot encoding.

use crate::core::{Raster, TargetImage};
use crate::error::{FitError, Result};
use crate::render::intensity_to_u8;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use std::path::Path;

/// Decode any supported image, convert to grayscale and resize to `width × height`.
///
/// Intensities are mapped to `[0, 1]`.
pub fn decode_grayscale(bytes: &[u8], width: u32, height: u32) -> Result<TargetImage> {
    if width == 0 || height == 0 {
        return Err(FitError::config(format!(
            "target size must be non-zero, got {width}x{height}"
        )));
    }
    let luma = image::load_from_memory(bytes)?.to_luma8();
    luma_to_target(&luma, width, height)
}

/// Like `decode_grayscale`, reading from a file.
pub fn load_grayscale(path: &Path, width: u32, height: u32) -> Result<TargetImage> {
    let bytes = std::fs::read(path)?;
    decode_grayscale(&bytes, width, height)
}

fn luma_to_target(luma: &GrayImage, width: u32, height: u32) -> Result<TargetImage> {
    let resized = if luma.dimensions() == (width, height) {
        luma.clone()
    } else {
        imageops::resize(luma, width, height, FilterType::Triangle)
    };
    let data = resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    TargetImage::new(Raster::from_vec(width, height, data)?)
}

/// Quantize a raster to 8-bit grayscale.
pub fn raster_to_gray(raster: &Raster) -> GrayImage {
    GrayImage::from_fn(raster.width(), raster.height(), |x, y| {
        image::Luma([intensity_to_u8(raster.get(x, y))])
    })
}

/// Encode a raster as an 8-bit grayscale PNG.
pub fn encode_png(raster: &Raster) -> Result<Vec<u8>> {
    let gray = raster_to_gray(raster);
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        gray.as_raw(),
        gray.width(),
        gray.height(),
        ExtendedColorType::L8,
    )?;
    Ok(out)
}

/// Encode a snapshot overlay as an RGB PNG.
pub fn encode_overlay_png(overlay: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        overlay.as_raw(),
        overlay.width(),
        overlay.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let raster = Raster::from_fn(width, height, |x, _| x as f32 / (width - 1) as f32);
        encode_png(&raster).unwrap()
    }

    #[test]
    fn test_decode_keeps_intensity_range() {
        let bytes = gradient_png(8, 4);
        let target = decode_grayscale(&bytes, 8, 4).unwrap();
        let r = target.raster();
        assert_eq!(r.get(0, 0), 0.0);
        assert_eq!(r.get(7, 3), 1.0);
        assert!(r.get(3, 1) > 0.0 && r.get(3, 1) < 1.0);
    }

    #[test]
    fn test_decode_resizes() {
        let bytes = gradient_png(16, 16);
        let target = decode_grayscale(&bytes, 5, 3).unwrap();
        assert_eq!((target.width(), target.height()), (5, 3));
        assert!(target.raster().data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_decode_rejects_zero_size_and_garbage() {
        let bytes = gradient_png(4, 4);
        assert!(matches!(
            decode_grayscale(&bytes, 0, 4),
            Err(FitError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            decode_grayscale(b"not an image", 4, 4),
            Err(FitError::Image(_))
        ));
    }

    #[test]
    fn test_png_signature() {
        let png = encode_overlay_png(&RgbImage::new(3, 2)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
