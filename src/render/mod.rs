//! Forward rendering pipeline (CPU implementation).
//!
//! This module implements the forward pass:
//! - Evaluate each 2D Gaussian over the coordinate grid
//! - Weighted composite
//! - Normalization by the per-image maximum
//!
//! No gradients computed here - see `diff` module for backward passes.

pub mod overlay;
pub mod rasterize;

// Re-export
pub use overlay::{intensity_to_u8, overlay_points};
pub use rasterize::{rasterize, Normalization, RenderOutput};
