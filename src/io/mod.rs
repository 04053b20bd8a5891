//! Boundary I/O.
//!
//! This module handles the formats the fitting core exchanges with callers:
//! - Image decoding to a grayscale target (any format `image` reads)
//! - PNG encoding of predictions and overlays
//! - JSON lists of Gaussian records

mod image_io;
mod records;

// Re-export public functions
pub use image_io::{
    decode_grayscale, encode_overlay_png, encode_png, load_grayscale, raster_to_gray,
};
pub use records::{load_records, parse_records, records_to_json, save_records};
