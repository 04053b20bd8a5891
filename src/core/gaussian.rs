//! The Gaussian field: the full parameter set being fitted.
//!
//! Each of the `N` Gaussians is parameterized by:
//! - Mean (pixel-space `(x, y)`, unconstrained)
//! - Raw covariance terms `(a, b, c)` (see `core::covariance`)
//! - Weight (intensity multiplier; only relative weight matters after normalization)
//!
//! Storage is struct-of-arrays so the optimizer can step each group as one slice.

use crate::core::covariance::{project_covariance, CovarianceMode, ProjectedCovariance};
use crate::error::{FitError, Result};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// One Gaussian in natural units, as exchanged with callers.
///
/// `sigma_x` / `sigma_y` are standard deviations; `sigma_xy` is the covariance
/// cross term and is clamped into the valid band when applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianRecord {
    pub index: usize,
    pub mean_x: f32,
    pub mean_y: f32,
    pub sigma_x: f32,
    pub sigma_y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma_xy: Option<f32>,
    pub weight: f32,
}

impl GaussianRecord {
    fn is_finite(&self) -> bool {
        self.mean_x.is_finite()
            && self.mean_y.is_finite()
            && self.sigma_x.is_finite()
            && self.sigma_y.is_finite()
            && self.sigma_xy.map_or(true, f32::is_finite)
            && self.weight.is_finite()
    }
}

/// Parameters of all Gaussians. The three arrays always have the same length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianField {
    means: Vec<Vector2<f32>>,
    raw_covariances: Vec<Vector3<f32>>,
    weights: Vec<f32>,
    mode: CovarianceMode,
}

impl GaussianField {
    pub fn new(
        means: Vec<Vector2<f32>>,
        raw_covariances: Vec<Vector3<f32>>,
        weights: Vec<f32>,
        mode: CovarianceMode,
    ) -> Result<Self> {
        if means.is_empty() {
            return Err(FitError::config("gaussian count must be positive"));
        }
        if means.len() != raw_covariances.len() || means.len() != weights.len() {
            return Err(FitError::config(format!(
                "parameter arrays disagree: {} means, {} covariances, {} weights",
                means.len(),
                raw_covariances.len(),
                weights.len()
            )));
        }
        Ok(Self {
            means,
            raw_covariances,
            weights,
            mode,
        })
    }

    /// Number of Gaussians.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn mode(&self) -> CovarianceMode {
        self.mode
    }

    pub fn means(&self) -> &[Vector2<f32>] {
        &self.means
    }

    pub fn raw_covariances(&self) -> &[Vector3<f32>] {
        &self.raw_covariances
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Mutable views of the three parameter groups. Slices, so the count cannot change.
    pub fn params_mut(&mut self) -> (&mut [Vector2<f32>], &mut [Vector3<f32>], &mut [f32]) {
        (
            &mut self.means,
            &mut self.raw_covariances,
            &mut self.weights,
        )
    }

    pub fn projected(&self, index: usize) -> ProjectedCovariance {
        project_covariance(&self.raw_covariances[index], self.mode)
    }

    pub fn projected_all(&self) -> Vec<ProjectedCovariance> {
        self.raw_covariances
            .iter()
            .map(|raw| project_covariance(raw, self.mode))
            .collect()
    }

    pub fn is_finite(&self) -> bool {
        self.means.iter().all(|m| m.x.is_finite() && m.y.is_finite())
            && self
                .raw_covariances
                .iter()
                .all(|r| r.x.is_finite() && r.y.is_finite() && r.z.is_finite())
            && self.weights.iter().all(|w| w.is_finite())
    }

    /// Export every Gaussian in natural units.
    pub fn records(&self) -> Vec<GaussianRecord> {
        (0..self.len())
            .map(|i| {
                let cov = self.projected(i);
                GaussianRecord {
                    index: i,
                    mean_x: self.means[i].x,
                    mean_y: self.means[i].y,
                    sigma_x: self.raw_covariances[i].x.abs(),
                    sigma_y: self.raw_covariances[i].y.abs(),
                    sigma_xy: Some(cov.xy),
                    weight: self.weights[i],
                }
            })
            .collect()
    }

    /// Overwrite the slots named by each record's `index`.
    ///
    /// All records are validated before anything is written, so a bad record
    /// leaves the field untouched. The supplied cross term is clamped through
    /// the covariance projector before it is stored.
    pub fn apply_records(&mut self, records: &[GaussianRecord]) -> Result<()> {
        for r in records {
            if r.index >= self.len() {
                return Err(FitError::config(format!(
                    "record index {} out of range for {} gaussians",
                    r.index,
                    self.len()
                )));
            }
            if !r.is_finite() {
                return Err(FitError::config(format!(
                    "record {} contains non-finite values",
                    r.index
                )));
            }
        }

        for r in records {
            let raw = Vector3::new(r.sigma_x, r.sigma_y, r.sigma_xy.unwrap_or(0.0));
            let cov = project_covariance(&raw, self.mode);
            self.means[r.index] = Vector2::new(r.mean_x, r.mean_y);
            self.raw_covariances[r.index] = Vector3::new(r.sigma_x, r.sigma_y, cov.xy);
            self.weights[r.index] = r.weight;
        }
        Ok(())
    }
}
