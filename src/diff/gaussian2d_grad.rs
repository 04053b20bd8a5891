//! Gradients for normalized 2D Gaussian evaluation.
//!
//! Forward (see `render::rasterize`):
//!   D = xx*yy - xy² + δ
//!   n = yy*dx² - 2*xy*dx*dy + xx*dy²        (so q = n / D)
//!   g = exp(-n / (2D)) / (2π sqrt(D))
//!   d = [dx, dy] = [px - mx, py - my]
//!
//! Working in log space:
//!   ln g = -n/(2D) - ½ ln D - ln 2π
//!
//! This module provides gradients w.r.t:
//! - mean (mx, my)
//! - covariance entries (xx, xy, yy) of Σ = [[xx, xy], [xy, yy]], where `xy`
//!   is the single shared off-diagonal parameter

use crate::core::ProjectedCovariance;
use nalgebra::Vector2;
use std::f32::consts::PI;

#[derive(Clone, Copy, Debug)]
pub struct Gaussian2DEvalGrads {
    pub value: f32,
    pub d_mean: Vector2<f32>,
    pub d_cov_xx: f32,
    pub d_cov_xy: f32,
    pub d_cov_yy: f32,
}

/// Evaluate a normalized 2D Gaussian density and its gradients w.r.t. mean and covariance.
pub fn gaussian2d_evaluate_with_grads(
    mean: Vector2<f32>,
    cov: &ProjectedCovariance,
    pixel: Vector2<f32>,
) -> Gaussian2DEvalGrads {
    let dx = pixel.x - mean.x;
    let dy = pixel.y - mean.y;

    let xx = cov.xx;
    let xy = cov.xy;
    let yy = cov.yy;
    let det = cov.stabilized_determinant();
    let inv_det = 1.0 / det;

    let n = yy * dx * dx - 2.0 * xy * dx * dy + xx * dy * dy;
    let value = (-0.5 * n * inv_det).exp() / (2.0 * PI * det.sqrt());

    // d(ln g)/d(mx) = (yy*dx - xy*dy) / D, and symmetric for y.
    let d_mean = Vector2::new(
        value * (yy * dx - xy * dy) * inv_det,
        value * (xx * dy - xy * dx) * inv_det,
    );

    // dD/dxx = yy, dD/dyy = xx, dD/dxy = -2xy.
    let n_over_d2 = n * inv_det * inv_det;
    let d_ln_xx = -0.5 * dy * dy * inv_det + 0.5 * n_over_d2 * yy - 0.5 * yy * inv_det;
    let d_ln_yy = -0.5 * dx * dx * inv_det + 0.5 * n_over_d2 * xx - 0.5 * xx * inv_det;
    let d_ln_xy = dx * dy * inv_det - n_over_d2 * xy + xy * inv_det;

    Gaussian2DEvalGrads {
        value,
        d_mean,
        d_cov_xx: value * d_ln_xx,
        d_cov_xy: value * d_ln_xy,
        d_cov_yy: value * d_ln_yy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClampState;
    use approx::assert_relative_eq;

    fn cov(xx: f32, xy: f32, yy: f32) -> ProjectedCovariance {
        ProjectedCovariance {
            xx,
            xy,
            yy,
            clamp: ClampState::Inside,
        }
    }

    #[test]
    fn test_value_at_mean_is_normalization_constant() {
        let c = cov(4.0, 0.0, 1.0);
        let g = gaussian2d_evaluate_with_grads(Vector2::new(1.0, 2.0), &c, Vector2::new(1.0, 2.0));
        let expected = 1.0 / (2.0 * PI * c.stabilized_determinant().sqrt());
        assert_relative_eq!(g.value, expected, epsilon = 1e-6);
        // Stationary point in the mean.
        assert_relative_eq!(g.d_mean.x, 0.0, epsilon = 1e-7);
        assert_relative_eq!(g.d_mean.y, 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_mean_gradient_points_toward_pixel() {
        let c = cov(1.0, 0.0, 1.0);
        let g = gaussian2d_evaluate_with_grads(Vector2::zeros(), &c, Vector2::new(1.0, 0.0));
        // Moving the mean toward the pixel increases the density there.
        assert!(g.d_mean.x > 0.0);
        assert_relative_eq!(g.d_mean.y, 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_cov_gradients_match_finite_difference() {
        let mean = Vector2::new(0.3, -0.2);
        let pixel = Vector2::new(1.1, 0.9);
        let base = cov(1.7, 0.4, 1.2);
        let g = gaussian2d_evaluate_with_grads(mean, &base, pixel);

        let eps = 1e-3f32;
        let eval = |c: ProjectedCovariance| gaussian2d_evaluate_with_grads(mean, &c, pixel).value;

        let num_xx = (eval(cov(1.7 + eps, 0.4, 1.2)) - eval(cov(1.7 - eps, 0.4, 1.2))) / (2.0 * eps);
        let num_xy = (eval(cov(1.7, 0.4 + eps, 1.2)) - eval(cov(1.7, 0.4 - eps, 1.2))) / (2.0 * eps);
        let num_yy = (eval(cov(1.7, 0.4, 1.2 + eps)) - eval(cov(1.7, 0.4, 1.2 - eps))) / (2.0 * eps);

        assert_relative_eq!(g.d_cov_xx, num_xx, epsilon = 1e-4);
        assert_relative_eq!(g.d_cov_xy, num_xy, epsilon = 1e-4);
        assert_relative_eq!(g.d_cov_yy, num_yy, epsilon = 1e-4);
    }
}
