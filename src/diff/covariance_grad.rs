//! Gradients for the covariance projector.
//!
//! Forward (see `core::covariance`):
//!   xx = a², yy = b²
//!   xy = clamp(c, -t, t),  t = s - margin(s),  s = |a||b|
//!
//! Backward routes dL/dxy by clamp state:
//! - Inside: to `c`
//! - Upper:  to `t` (hence `a`, `b`), since xy = t
//! - Lower:  to `-t`
//! - Pinned: nowhere (xy is the constant 0)
//!
//! So a Gaussian pressed against the band still learns through its variances
//! instead of receiving a dead gradient.

use crate::core::covariance::band_slope;
use crate::core::{ClampState, ProjectedCovariance};
use nalgebra::Vector3;

/// Chain dL/d(xx, xy, yy) back to the raw parameters (a, b, c).
pub fn project_covariance_backward(
    raw: &Vector3<f32>,
    projected: &ProjectedCovariance,
    d_xx: f32,
    d_xy: f32,
    d_yy: f32,
) -> Vector3<f32> {
    let a = raw.x;
    let b = raw.y;

    let mut d_a = d_xx * 2.0 * a;
    let mut d_b = d_yy * 2.0 * b;
    let mut d_c = 0.0f32;

    // dt/da = t'(s) sign(a)|b|, dt/db = t'(s) |a|sign(b)
    let slope = band_slope(a.abs() * b.abs());
    let dt_da = slope * a.signum() * b.abs();
    let dt_db = slope * a.abs() * b.signum();

    match projected.clamp {
        ClampState::Inside => d_c = d_xy,
        ClampState::Upper => {
            d_a += d_xy * dt_da;
            d_b += d_xy * dt_db;
        }
        ClampState::Lower => {
            d_a -= d_xy * dt_da;
            d_b -= d_xy * dt_db;
        }
        ClampState::Pinned => {}
    }

    Vector3::new(d_a, d_b, d_c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{project_covariance, CovarianceMode};
    use approx::assert_relative_eq;

    /// L = 0.3*xx - 1.7*xy + 0.9*yy, so dL/d(xx, xy, yy) = (0.3, -1.7, 0.9).
    fn loss(raw: &Vector3<f32>, mode: CovarianceMode) -> f32 {
        let p = project_covariance(raw, mode);
        0.3 * p.xx - 1.7 * p.xy + 0.9 * p.yy
    }

    fn check(raw: Vector3<f32>, mode: CovarianceMode) {
        let p = project_covariance(&raw, mode);
        let ana = project_covariance_backward(&raw, &p, 0.3, -1.7, 0.9);
        let eps = 1e-3f32;
        for k in 0..3 {
            let mut plus = raw;
            let mut minus = raw;
            plus[k] += eps;
            minus[k] -= eps;
            let num = (loss(&plus, mode) - loss(&minus, mode)) / (2.0 * eps);
            assert_relative_eq!(ana[k], num, epsilon = 2e-2);
        }
    }

    #[test]
    fn test_inside_band_matches_finite_difference() {
        check(Vector3::new(1.5, -2.0, 0.7), CovarianceMode::Full);
    }

    #[test]
    fn test_saturated_band_matches_finite_difference() {
        check(Vector3::new(1.5, 2.0, 50.0), CovarianceMode::Full);
        check(Vector3::new(-1.5, 2.0, -50.0), CovarianceMode::Full);
    }

    #[test]
    fn test_axis_aligned_has_no_cross_gradient() {
        let raw = Vector3::new(1.0, 2.0, 0.4);
        let p = project_covariance(&raw, CovarianceMode::AxisAligned);
        let g = project_covariance_backward(&raw, &p, 1.0, 5.0, 1.0);
        assert_eq!(g.z, 0.0);
        assert_relative_eq!(g.x, 2.0);
        assert_relative_eq!(g.y, 4.0);
    }

    #[test]
    fn test_saturated_gradient_reaches_variances() {
        let raw = Vector3::new(1.0, 1.0, 10.0);
        let p = project_covariance(&raw, CovarianceMode::Full);
        assert_eq!(p.clamp, ClampState::Upper);
        let g = project_covariance_backward(&raw, &p, 0.0, 1.0, 0.0);
        assert_eq!(g.z, 0.0);
        assert!(g.x > 0.0 && g.y > 0.0);
    }
}
