//! Backward pass for `render::rasterize`.
//!
//! Forward:
//!   P(p) = Σ_i w_i g_i(p)
//!   Y(p) = P(p) / M,   M = P(p*),  p* = argmax P
//!
//! Backward, given G(p) = dL/dY(p):
//!   dL/dP(q)  = G(q) / M
//!   dL/dP(p*) += -Σ_p G(p) P(p) / M²        (max routes to the argmax pixel only)
//!   dL/dw_i   = Σ_p dL/dP(p) g_i(p)
//!   dL/dθ_i   = Σ_p dL/dP(p) w_i dg_i(p)/dθ_i
//!
//! The covariance gradient is then chained through the projector to (a, b, c).

use crate::core::{CoordinateGrid, GaussianField};
use crate::diff::covariance_grad::project_covariance_backward;
use crate::diff::gaussian2d_grad::gaussian2d_evaluate_with_grads;
use crate::render::RenderOutput;
use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;

/// Gradients of a scalar loss w.r.t. every field parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldGrads {
    pub d_means: Vec<Vector2<f32>>,
    pub d_raw_covariances: Vec<Vector3<f32>>,
    pub d_weights: Vec<f32>,
}

impl FieldGrads {
    pub fn zeros(count: usize) -> Self {
        Self {
            d_means: vec![Vector2::zeros(); count],
            d_raw_covariances: vec![Vector3::zeros(); count],
            d_weights: vec![0.0; count],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.d_means.iter().all(|g| g.x.is_finite() && g.y.is_finite())
            && self
                .d_raw_covariances
                .iter()
                .all(|g| g.x.is_finite() && g.y.is_finite() && g.z.is_finite())
            && self.d_weights.iter().all(|g| g.is_finite())
    }
}

/// dL/dP from dL/dY, undoing the max normalization.
pub fn composite_grad(render: &RenderOutput, d_image: &[f32]) -> Vec<f32> {
    assert_eq!(d_image.len(), render.composite.len());

    let Some(norm) = render.normalization else {
        return d_image.to_vec();
    };

    let inv_max = 1.0 / norm.max;
    let mut d_composite: Vec<f32> = d_image.iter().map(|g| g * inv_max).collect();

    let dot: f32 = d_image
        .iter()
        .zip(render.composite.data())
        .map(|(g, p)| g * p)
        .sum();
    d_composite[norm.argmax] -= dot * inv_max * inv_max;

    d_composite
}

/// Per-thread accumulator over (mean, covariance entries, weight).
struct ThreadLocalGrads {
    d_means: Vec<Vector2<f32>>,
    d_cov: Vec<Vector3<f32>>,
    d_weights: Vec<f32>,
}

impl ThreadLocalGrads {
    fn new(count: usize) -> Self {
        Self {
            d_means: vec![Vector2::zeros(); count],
            d_cov: vec![Vector3::zeros(); count],
            d_weights: vec![0.0; count],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for i in 0..self.d_means.len() {
            self.d_means[i] += other.d_means[i];
            self.d_cov[i] += other.d_cov[i];
            self.d_weights[i] += other.d_weights[i];
        }
        self
    }
}

/// Backpropagate `d_image = dL/dY` through the forward render.
///
/// `render` must come from `rasterize(field, grid)` with the same field.
pub fn rasterize_backward(
    field: &GaussianField,
    grid: &CoordinateGrid,
    render: &RenderOutput,
    d_image: &[f32],
) -> FieldGrads {
    let count = field.len();
    let d_composite = composite_grad(render, d_image);

    let means = field.means();
    let weights = field.weights();
    let projected = &render.projected;
    let points = grid.points();

    // Thread-local accumulation, reduced at the end.
    let acc = d_composite
        .par_iter()
        .enumerate()
        .fold(
            || ThreadLocalGrads::new(count),
            |mut local, (idx, &d_p)| {
                if d_p == 0.0 {
                    return local;
                }
                let pixel = points[idx];
                for i in 0..count {
                    let g = gaussian2d_evaluate_with_grads(means[i], &projected[i], pixel);
                    let scale = d_p * weights[i];
                    local.d_weights[i] += d_p * g.value;
                    local.d_means[i] += g.d_mean * scale;
                    local.d_cov[i] += Vector3::new(g.d_cov_xx, g.d_cov_xy, g.d_cov_yy) * scale;
                }
                local
            },
        )
        .reduce(|| ThreadLocalGrads::new(count), ThreadLocalGrads::merge);

    let d_raw_covariances = field
        .raw_covariances()
        .iter()
        .zip(projected)
        .zip(&acc.d_cov)
        .map(|((raw, p), d)| project_covariance_backward(raw, p, d.x, d.y, d.z))
        .collect();

    FieldGrads {
        d_means: acc.d_means,
        d_raw_covariances,
        d_weights: acc.d_weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CovarianceMode;
    use crate::render::rasterize;

    #[test]
    fn test_composite_grad_without_normalization_is_identity() {
        let grid = CoordinateGrid::new(3, 3);
        let field = GaussianField::new(
            vec![Vector2::new(1.0, 1.0)],
            vec![Vector3::new(1.0, 1.0, 0.0)],
            vec![-1.0],
            CovarianceMode::Full,
        )
        .unwrap();
        let render = rasterize(&field, &grid);
        let d = vec![0.5f32; 9];
        assert_eq!(composite_grad(&render, &d), d);
    }

    #[test]
    fn test_upstream_only_at_argmax_cancels() {
        // If G is nonzero only at the argmax pixel, Y(p*) == 1 regardless of P,
        // so the composite gradient must vanish there.
        let grid = CoordinateGrid::new(4, 4);
        let field = GaussianField::new(
            vec![Vector2::new(2.0, 1.0)],
            vec![Vector3::new(1.0, 1.3, 0.2)],
            vec![0.7],
            CovarianceMode::Full,
        )
        .unwrap();
        let render = rasterize(&field, &grid);
        let argmax = render.normalization.unwrap().argmax;
        let mut d = vec![0.0f32; 16];
        d[argmax] = 1.0;
        let dc = composite_grad(&render, &d);
        assert!(dc[argmax].abs() < 1e-5, "got {}", dc[argmax]);
        let grads = rasterize_backward(&field, &grid, &render, &d);
        assert!(grads.d_weights[0].abs() < 1e-5);
    }

    #[test]
    fn test_wide_saturated_gaussian_keeps_covariance_gradient() {
        let grid = CoordinateGrid::new(20, 20);
        let field = GaussianField::new(
            vec![Vector2::new(9.4, 10.3)],
            vec![Vector3::new(200.0, 150.0, 1e9)],
            vec![1.0],
            CovarianceMode::Full,
        )
        .unwrap();
        let render = rasterize(&field, &grid);
        assert_eq!(render.projected[0].clamp, crate::core::ClampState::Upper);
        assert!(render.projected[0].determinant() > 0.0);

        let target = vec![0.5f32; 400];
        let (_, d_image) = crate::optim::loss::mse_loss_and_grad(render.image.data(), &target);
        let grads = rasterize_backward(&field, &grid, &render, &d_image);
        let d = grads.d_raw_covariances[0];
        assert!(grads.is_finite());
        assert!(d.x != 0.0 || d.y != 0.0, "dead covariance gradient: {d:?}");
    }

    #[test]
    fn test_field_grads_finite_check() {
        let mut g = FieldGrads::zeros(2);
        assert!(g.is_finite());
        g.d_weights[1] = f32::NAN;
        assert!(!g.is_finite());
    }
}
