//! Mapping raw per-Gaussian scalars to a valid 2×2 covariance.
//!
//! Each Gaussian stores three free parameters `(a, b, c)`:
//!
//! ```text
//! σx² = a²
//! σy² = b²
//! σxy = clamp(c, -t, t),   t = sqrt(σx² σy²) - max(ε, 4 u sqrt(σx² σy²))
//! ```
//!
//! where `u` is the f32 unit roundoff. The relative term takes over once
//! `sqrt(σx² σy²)` is large enough that `ε` would round away.
//!
//! The band `[-t, t]` keeps `det Σ = σx² σy² - σxy²` strictly positive. Since
//! `a` and `b` move on every optimizer step, the band moves too, so the clamp
//! is applied on every read rather than once at load time.

use nalgebra::{Matrix2, Vector3};
use serde::{Deserialize, Serialize};

/// Margin subtracted from `sqrt(σx² σy²)` to keep Σ strictly positive-definite.
pub const COVARIANCE_EPS: f32 = 1e-3;

/// Added to `det Σ` before it is inverted or square-rooted.
pub const DET_FLOOR: f32 = 1e-6;

/// Which covariance family the field uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceMode {
    /// Full anisotropic covariance with a cross term.
    #[default]
    Full,
    /// Axis-aligned covariance; the raw cross term is ignored.
    AxisAligned,
}

/// Where `c` landed relative to the admissible band. Recorded so the backward
/// pass can route gradients without recomputing the branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClampState {
    /// `-t <= c <= t`: `σxy = c`.
    Inside,
    /// `c > t`: `σxy = t`.
    Upper,
    /// `c < -t`: `σxy = -t`.
    Lower,
    /// Band is empty (`t <= 0`) or the mode is axis-aligned: `σxy = 0`.
    Pinned,
}

/// Projected covariance `[[xx, xy], [xy, yy]]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedCovariance {
    pub xx: f32,
    pub xy: f32,
    pub yy: f32,
    pub clamp: ClampState,
}

impl ProjectedCovariance {
    /// `xx * yy - xy²`, evaluated as `(s - |xy|)(s + |xy|)` with `s = sqrt(xx yy)`
    /// to avoid cancellation when `xy` sits on the band edge.
    pub fn determinant(&self) -> f32 {
        let s = (self.xx * self.yy).sqrt();
        let xy = self.xy.abs();
        (s - xy) * (s + xy)
    }

    /// Determinant used for normalization and inversion.
    pub fn stabilized_determinant(&self) -> f32 {
        self.determinant() + DET_FLOOR
    }

    pub fn as_matrix(&self) -> Matrix2<f32> {
        Matrix2::new(self.xx, self.xy, self.xy, self.yy)
    }
}

/// Distance kept between the band edge and `s = sqrt(σx² σy²)`.
pub fn band_margin(s: f32) -> f32 {
    COVARIANCE_EPS.max(s * 4.0 * f32::EPSILON)
}

/// `dt/ds` for `t = s - band_margin(s)`.
pub fn band_slope(s: f32) -> f32 {
    if s * 4.0 * f32::EPSILON > COVARIANCE_EPS {
        1.0 - 4.0 * f32::EPSILON
    } else {
        1.0
    }
}

/// Half-width of the admissible band for `σxy`, before flooring at zero.
pub fn cross_term_band(xx: f32, yy: f32) -> f32 {
    let s = (xx * yy).sqrt();
    s - band_margin(s)
}

/// Project raw `(a, b, c)` into a positive-definite covariance.
pub fn project_covariance(raw: &Vector3<f32>, mode: CovarianceMode) -> ProjectedCovariance {
    let xx = raw.x * raw.x;
    let yy = raw.y * raw.y;

    if mode == CovarianceMode::AxisAligned {
        return ProjectedCovariance {
            xx,
            xy: 0.0,
            yy,
            clamp: ClampState::Pinned,
        };
    }

    let t = cross_term_band(xx, yy);
    if !(t > 0.0) {
        return ProjectedCovariance {
            xx,
            xy: 0.0,
            yy,
            clamp: ClampState::Pinned,
        };
    }

    let c = raw.z;
    let (xy, clamp) = if c > t {
        (t, ClampState::Upper)
    } else if c < -t {
        (-t, ClampState::Lower)
    } else {
        (c, ClampState::Inside)
    };

    ProjectedCovariance { xx, xy, yy, clamp }
}
