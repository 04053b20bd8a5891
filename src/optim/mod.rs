//! Optimization components.
//!
//! This module contains everything needed for one training step:
//! - Adam optimizer (per parameter group)
//! - Loss functions (MSE, L1, L1 + SSIM) with their per-pixel gradients

pub mod adam;
pub mod loss;

pub use adam::{AdamConfig, FieldOptimizer};
pub use loss::LossMetric;
