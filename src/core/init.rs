//! Seeded random initialization of a Gaussian field.

use crate::core::covariance::CovarianceMode;
use crate::core::GaussianField;
use crate::error::{FitError, Result};
use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How a fresh field is drawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInit {
    pub seed: u64,
    /// Initial standard deviation along both axes (pixels).
    pub sigma: f32,
    pub weight_min: f32,
    pub weight_max: f32,
}

impl Default for FieldInit {
    fn default() -> Self {
        Self {
            seed: 0,
            sigma: 5.0,
            weight_min: 0.5,
            weight_max: 1.0,
        }
    }
}

impl FieldInit {
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(FitError::config(format!(
                "initial sigma must be positive, got {}",
                self.sigma
            )));
        }
        if !(self.weight_min.is_finite()
            && self.weight_max.is_finite()
            && self.weight_min <= self.weight_max)
        {
            return Err(FitError::config(format!(
                "invalid initial weight range [{}, {})",
                self.weight_min, self.weight_max
            )));
        }
        Ok(())
    }
}

/// Draw `count` Gaussians for a `width × height` image.
///
/// - Means uniform over `[0, width) × [0, height)`
/// - Isotropic covariance with standard deviation `init.sigma`, no cross term
/// - Weights uniform in `[weight_min, weight_max)`
///
/// The same seed, size and count always produce the same field.
pub fn random_field(
    width: u32,
    height: u32,
    count: usize,
    init: &FieldInit,
    mode: CovarianceMode,
) -> Result<GaussianField> {
    if count == 0 {
        return Err(FitError::config("gaussian count must be positive"));
    }
    if width == 0 || height == 0 {
        return Err(FitError::config(format!(
            "image size must be non-zero, got {width}x{height}"
        )));
    }
    init.validate()?;

    let mut rng = StdRng::seed_from_u64(init.seed);
    let extent = Vector2::new(width as f32, height as f32);

    let means: Vec<Vector2<f32>> = (0..count)
        .map(|_| {
            let u = Vector2::new(rng.gen::<f32>(), rng.gen::<f32>());
            u.component_mul(&extent)
        })
        .collect();

    let raw_covariances = vec![Vector3::new(init.sigma, init.sigma, 0.0); count];

    let span = init.weight_max - init.weight_min;
    let weights: Vec<f32> = (0..count)
        .map(|_| init.weight_min + rng.gen::<f32>() * span)
        .collect();

    GaussianField::new(means, raw_covariances, weights, mode)
}
