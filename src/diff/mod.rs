//! Differentiable operations (backward passes).
//!
//! This module implements gradient computation for all forward operations.
//! Each submodule corresponds to a forward operation in `render` or `core`:
//! - `gaussian2d_grad`: density w.r.t. mean and covariance entries
//! - `covariance_grad`: projector (clamp included) w.r.t. raw terms
//! - `rasterize_grad`: composite + max normalization, assembled per Gaussian

pub mod covariance_grad;
pub mod gaussian2d_grad;
pub mod rasterize_grad;

pub use rasterize_grad::{rasterize_backward, FieldGrads};
