//! Forward model: evaluate every Gaussian over the pixel grid, composite,
//! and normalize by the image maximum.
//!
//! ```text
//! g_i(p)  = exp(-½ (p-μ_i)ᵀ Σ_i⁻¹ (p-μ_i)) / (2π sqrt(det Σ_i + δ))
//! P(p)    = Σ_i w_i g_i(p)
//! Y(p)    = P(p) / max_q P(q)        (skipped when the max is not positive)
//! ```
//!
//! Cost is `O(N · H · W)`; rows are evaluated in parallel.

use crate::core::{CoordinateGrid, GaussianField, ProjectedCovariance, Raster};
use nalgebra::Vector2;
use rayon::prelude::*;
use std::f32::consts::PI;

/// A Gaussian with its inverse covariance and normalization constant precomputed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PreparedGaussian {
    pub mean: Vector2<f32>,
    pub weight: f32,
    pub inv_xx: f32,
    pub inv_xy: f32,
    pub inv_yy: f32,
    pub norm: f32,
}

impl PreparedGaussian {
    pub fn new(mean: Vector2<f32>, cov: &ProjectedCovariance, weight: f32) -> Self {
        let det = cov.stabilized_determinant();
        let inv_det = 1.0 / det;
        Self {
            mean,
            weight,
            inv_xx: cov.yy * inv_det,
            inv_xy: -cov.xy * inv_det,
            inv_yy: cov.xx * inv_det,
            norm: 1.0 / (2.0 * PI * det.sqrt()),
        }
    }

    /// Normalized density at `p` (without the weight).
    #[inline]
    pub fn density(&self, p: &Vector2<f32>) -> f32 {
        let dx = p.x - self.mean.x;
        let dy = p.y - self.mean.y;
        let q = self.inv_xx * dx * dx + 2.0 * self.inv_xy * dx * dy + self.inv_yy * dy * dy;
        self.norm * (-0.5 * q).exp()
    }
}

pub(crate) fn prepare(field: &GaussianField, projected: &[ProjectedCovariance]) -> Vec<PreparedGaussian> {
    field
        .means()
        .iter()
        .zip(projected)
        .zip(field.weights())
        .map(|((m, cov), &w)| PreparedGaussian::new(*m, cov, w))
        .collect()
}

/// Normalization applied to the composite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    /// Value the composite was divided by.
    pub max: f32,
    /// Flat pixel index the maximum came from.
    pub argmax: usize,
}

/// Result of one forward pass. Keeps the intermediates the backward pass needs,
/// so a snapshot can reuse `image` instead of rendering again.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    /// Normalized prediction.
    pub image: Raster,
    /// Weighted sum of densities before normalization.
    pub composite: Raster,
    /// `None` when the composite maximum was not positive.
    pub normalization: Option<Normalization>,
    /// Covariances exactly as used for this render.
    pub projected: Vec<ProjectedCovariance>,
}

/// Render the field over `grid`. Does not modify the field.
pub fn rasterize(field: &GaussianField, grid: &CoordinateGrid) -> RenderOutput {
    let projected = field.projected_all();
    let prepared = prepare(field, &projected);

    let width = grid.width() as usize;
    let mut composite = vec![0.0f32; grid.len()];
    if width > 0 {
        composite
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let coords = grid.row(y as u32);
                for (out, p) in row.iter_mut().zip(coords) {
                    let mut acc = 0.0f32;
                    for g in &prepared {
                        acc += g.weight * g.density(p);
                    }
                    *out = acc;
                }
            });
    }

    let composite = Raster::from_vec(grid.width(), grid.height(), composite)
        .unwrap_or_else(|_| Raster::new(grid.width(), grid.height()));

    let normalization = match composite.argmax() {
        Some((argmax, max)) if max > 0.0 => Some(Normalization { max, argmax }),
        _ => None,
    };

    let mut image = composite.clone();
    if let Some(n) = normalization {
        let inv = 1.0 / n.max;
        for v in image.data_mut() {
            *v *= inv;
        }
    }

    RenderOutput {
        image,
        composite,
        normalization,
        projected,
    }
}
