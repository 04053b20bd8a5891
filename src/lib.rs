//! # splat2d-rs: 2D Gaussian image fitting in Rust
//!
//! This crate approximates a grayscale image as a weighted sum of a fixed
//! number of anisotropic 2D Gaussians. Positions, covariances and weights are
//! fitted with Adam against the target image, using hand-derived gradients.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - `core`: Fundamental data structures (rasters, grid, Gaussian field, covariance projection)
//! - `render`: Forward rendering pipeline (CPU, rayon)
//! - `diff`: Differentiable operations (backward passes)
//! - `optim`: Optimization (Adam, loss functions)
//! - `session`: Training session, cancellable training loop and progress events
//! - `io`: Image decoding, PNG encoding, JSON parameter records
//!
//! ## Learning Path
//!
//! This implementation prioritizes clarity:
//! 1. Understand the math through explicit implementations
//! 2. Verify correctness through gradient checking
//! 3. Optimize only when profiling shows need

// Core data structures and math
pub mod core;

// Error taxonomy
pub mod error;

// I/O boundary (image decode, PNG, JSON)
pub mod io;

// Forward rendering pipeline
pub mod render;

// Differentiable operations (backward passes)
pub mod diff;

// Optimization (Adam, losses)
pub mod optim;

// Session state and the training loop
pub mod session;

// Re-export commonly used types at crate root for convenience
pub use crate::core::{CovarianceMode, GaussianField, GaussianRecord, Raster, TargetImage};
pub use error::{FitError, Result};
pub use optim::LossMetric;
pub use session::{
    DeviceInfo, Session, SessionConfig, Snapshot, TrainEvent, TrainOutcome, TrainParams,
    TrainStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
