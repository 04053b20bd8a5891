//! Core data structures.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Raster` / `TargetImage`: single-channel float images
//! - `CoordinateGrid`: cached pixel coordinates
//! - `GaussianField`: means, raw covariance terms and weights
//! - Covariance projection keeping every Σ positive-definite
//!
//! All types here are "pure data" - no I/O, no rendering logic.

pub mod covariance;
mod gaussian;
mod grid;
pub mod init;
mod raster;

// Re-export public types
pub use covariance::{project_covariance, ClampState, CovarianceMode, ProjectedCovariance};
pub use gaussian::{GaussianField, GaussianRecord};
pub use grid::CoordinateGrid;
pub use init::{random_field, FieldInit};
pub use raster::{Raster, TargetImage};
