//! Loss functions over single-channel images.
//!
//! Every function returns `(loss, dL/d(rendered))` so the backward pass can
//! start from the per-pixel gradient.

use crate::core::Raster;
use crate::error::{FitError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default L1 share of the blended L1 + SSIM loss.
pub const DEFAULT_L1_WEIGHT: f32 = 0.2;

/// Selectable training loss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossMetric {
    /// Mean squared error.
    #[default]
    Mse,
    /// Mean absolute error.
    L1,
    /// `l1_weight * L1 + (1 - l1_weight) * (1 - SSIM)`.
    L1Ssim { l1_weight: f32 },
}

impl FromStr for LossMetric {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mse" | "l2" | "mean_squared_error" => Ok(LossMetric::Mse),
            "l1" | "mae" | "mean_absolute_error" => Ok(LossMetric::L1),
            "l1_ssim" | "l1+ssim" | "l1_dssim" => Ok(LossMetric::L1Ssim {
                l1_weight: DEFAULT_L1_WEIGHT,
            }),
            other => Err(FitError::config(format!("unknown loss metric '{other}'"))),
        }
    }
}

impl fmt::Display for LossMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossMetric::Mse => write!(f, "mse"),
            LossMetric::L1 => write!(f, "l1"),
            LossMetric::L1Ssim { l1_weight } => write!(f, "l1_ssim({l1_weight})"),
        }
    }
}

impl LossMetric {
    pub fn validate(&self) -> Result<()> {
        if let LossMetric::L1Ssim { l1_weight } = self {
            if !(0.0..=1.0).contains(l1_weight) {
                return Err(FitError::config(format!(
                    "l1 weight must lie in [0, 1], got {l1_weight}"
                )));
            }
        }
        Ok(())
    }

    /// Loss and per-pixel gradient w.r.t. `rendered`.
    pub fn loss_and_grad(&self, rendered: &Raster, target: &Raster) -> (f32, Vec<f32>) {
        assert_eq!(rendered.width(), target.width());
        assert_eq!(rendered.height(), target.height());
        match *self {
            LossMetric::Mse => mse_loss_and_grad(rendered.data(), target.data()),
            LossMetric::L1 => l1_loss_and_grad(rendered.data(), target.data()),
            LossMetric::L1Ssim { l1_weight } => l1_ssim_loss_and_grad(
                rendered.data(),
                target.data(),
                rendered.width(),
                rendered.height(),
                l1_weight,
            ),
        }
    }

    /// Loss value only.
    pub fn loss(&self, rendered: &Raster, target: &Raster) -> f32 {
        self.loss_and_grad(rendered, target).0
    }
}

/// Mean squared error, returning (loss, d_rendered).
pub fn mse_loss_and_grad(rendered: &[f32], target: &[f32]) -> (f32, Vec<f32>) {
    assert_eq!(rendered.len(), target.len());
    let n = rendered.len().max(1) as f32;
    let mut loss = 0.0f32;
    let mut d = vec![0.0f32; rendered.len()];

    for i in 0..rendered.len() {
        let diff = rendered[i] - target[i];
        loss += diff * diff;
        d[i] = diff * (2.0 / n);
    }

    (loss / n, d)
}

/// Mean absolute error, returning (loss, d_rendered). The subgradient at 0 is 0.
pub fn l1_loss_and_grad(rendered: &[f32], target: &[f32]) -> (f32, Vec<f32>) {
    assert_eq!(rendered.len(), target.len());
    let n = rendered.len().max(1) as f32;
    let mut loss = 0.0f32;
    let mut d = vec![0.0f32; rendered.len()];

    for i in 0..rendered.len() {
        let diff = rendered[i] - target[i];
        loss += diff.abs();
        d[i] = if diff > 0.0 {
            1.0 / n
        } else if diff < 0.0 {
            -1.0 / n
        } else {
            0.0
        };
    }

    (loss / n, d)
}

fn gaussian_kernel_offsets(radius: i32, sigma: f32) -> Vec<(i32, i32, f32)> {
    let mut out = Vec::new();
    let denom = 2.0 * sigma * sigma;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            let w = (-r2 / denom).exp();
            out.push((dx, dy, w));
        }
    }
    out
}

const SSIM_RADIUS: i32 = 5; // 11x11
const SSIM_SIGMA: f32 = 1.5;
const SSIM_C1: f32 = 0.01 * 0.01;
const SSIM_C2: f32 = 0.03 * 0.03;

/// Mean SSIM over the image and its gradient w.r.t. `rendered`.
///
/// - 11×11 Gaussian window, sigma = 1.5, data range `[0, 1]`
/// - At the border the window is truncated and renormalized over in-bounds pixels
pub fn ssim_and_grad(rendered: &[f32], target: &[f32], width: u32, height: u32) -> (f32, Vec<f32>) {
    assert_eq!(rendered.len(), target.len());
    assert_eq!(rendered.len(), (width as usize) * (height as usize));

    let kernel = gaussian_kernel_offsets(SSIM_RADIUS, SSIM_SIGMA);
    let w_i = width as i32;
    let h_i = height as i32;
    let n = rendered.len().max(1) as f32;

    let mut ssim_sum = 0.0f32;
    let mut d_ssim = vec![0.0f32; rendered.len()];
    // In-bounds window taps for the current center: (flat index, normalized weight).
    let mut taps: Vec<(usize, f32)> = Vec::with_capacity(kernel.len());

    for py in 0..h_i {
        for px in 0..w_i {
            taps.clear();
            let mut wsum = 0.0f32;
            for &(dx, dy, w) in &kernel {
                let x = px + dx;
                let y = py + dy;
                if x < 0 || x >= w_i || y < 0 || y >= h_i {
                    continue;
                }
                taps.push(((y * w_i + x) as usize, w));
                wsum += w;
            }
            for tap in taps.iter_mut() {
                tap.1 /= wsum;
            }

            let mut mu_x = 0.0f32;
            let mut mu_y = 0.0f32;
            for &(idx, wi) in &taps {
                mu_x += wi * rendered[idx];
                mu_y += wi * target[idx];
            }

            let mut var_x = 0.0f32;
            let mut var_y = 0.0f32;
            let mut cov = 0.0f32;
            for &(idx, wi) in &taps {
                let dxv = rendered[idx] - mu_x;
                let dyv = target[idx] - mu_y;
                var_x += wi * dxv * dxv;
                var_y += wi * dyv * dyv;
                cov += wi * dxv * dyv;
            }

            let a = 2.0 * mu_x * mu_y + SSIM_C1;
            let b = 2.0 * cov + SSIM_C2;
            let c = mu_x * mu_x + mu_y * mu_y + SSIM_C1;
            let d = var_x + var_y + SSIM_C2;
            let inv_cd = 1.0 / (c * d);
            let ssim = a * b * inv_cd;
            ssim_sum += ssim;

            // dssim/d(rendered[q]) for all q in the window.
            let d_ssim_da = b * inv_cd;
            let d_ssim_db = a * inv_cd;
            let d_ssim_dc = -ssim / c;
            let d_ssim_dd = -ssim / d;

            let d_mu_x = d_ssim_da * (2.0 * mu_y) + d_ssim_dc * (2.0 * mu_x);
            let d_var_x = d_ssim_dd;
            let d_cov = d_ssim_db * 2.0;

            for &(idx, wi) in &taps {
                let dxv = rendered[idx] - mu_x;
                let dyv = target[idx] - mu_y;
                d_ssim[idx] +=
                    (d_mu_x * wi + d_var_x * (2.0 * wi * dxv) + d_cov * (wi * dyv)) / n;
            }
        }
    }

    (ssim_sum / n, d_ssim)
}

/// Blended loss: `l1_weight * L1 + (1 - l1_weight) * (1 - SSIM)`.
pub fn l1_ssim_loss_and_grad(
    rendered: &[f32],
    target: &[f32],
    width: u32,
    height: u32,
    l1_weight: f32,
) -> (f32, Vec<f32>) {
    let (l1, d_l1) = l1_loss_and_grad(rendered, target);
    let (ssim, d_ssim) = ssim_and_grad(rendered, target, width, height);
    let dssim_weight = 1.0 - l1_weight;

    let loss = l1_weight * l1 + dssim_weight * (1.0 - ssim);
    let d = d_l1
        .iter()
        .zip(&d_ssim)
        .map(|(g1, gs)| l1_weight * g1 - dssim_weight * gs)
        .collect();

    (loss, d)
}
