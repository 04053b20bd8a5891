//! Session and training-run configuration.

use crate::core::{CovarianceMode, FieldInit};
use crate::error::{FitError, Result};
use crate::optim::{AdamConfig, LossMetric};
use serde::{Deserialize, Serialize};

/// Settings fixed for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seed for every (re)initialization of the field.
    pub seed: u64,
    pub covariance: CovarianceMode,
    /// Initial standard deviation of each Gaussian, in pixels.
    pub init_sigma: f32,
    pub init_weight_min: f32,
    pub init_weight_max: f32,
    /// Capacity of the channel returned by `Session::event_channel`.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            covariance: CovarianceMode::Full,
            init_sigma: 5.0,
            init_weight_min: 0.5,
            init_weight_max: 1.0,
            event_buffer: 16,
        }
    }
}

impl SessionConfig {
    pub fn field_init(&self) -> FieldInit {
        FieldInit {
            seed: self.seed,
            sigma: self.init_sigma,
            weight_min: self.init_weight_min,
            weight_max: self.init_weight_max,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(FitError::config("event buffer must hold at least one event"));
        }
        self.field_init().validate()
    }
}

/// Parameters of one training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub steps: u32,
    pub lr: f32,
    pub metric: LossMetric,
    /// Emit a progress snapshot every this many steps (and after the last one).
    pub update_interval: u32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for TrainParams {
    fn default() -> Self {
        let adam = AdamConfig::default();
        Self {
            steps: 10_000,
            lr: adam.lr,
            metric: LossMetric::default(),
            update_interval: 100,
            beta1: adam.beta1,
            beta2: adam.beta2,
            eps: adam.eps,
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(FitError::config("steps must be positive"));
        }
        if self.update_interval == 0 {
            return Err(FitError::config("update interval must be positive"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(FitError::config(format!(
                "learning rate must be positive and finite, got {}",
                self.lr
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(FitError::config(format!("{name} must lie in [0, 1), got {beta}")));
            }
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(FitError::config(format!("eps must be positive, got {}", self.eps)));
        }
        self.metric.validate()
    }

    pub fn adam(&self) -> AdamConfig {
        AdamConfig {
            lr: self.lr,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
        }
    }

    /// True when a snapshot is due after `step` completed steps.
    pub fn reports_at(&self, step: u32) -> bool {
        step % self.update_interval == 0 || step == self.steps
    }
}
