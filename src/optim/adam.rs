//! Adam optimizer (minimal).
//!
//! One optimizer instance per parameter group; all groups of a run share the
//! same learning rate and decay rates. State is created fresh for every run.

use crate::core::GaussianField;
use crate::diff::FieldGrads;
use nalgebra::SVector;

/// Adam hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Adam over one scalar per Gaussian: the field's weights.
///
/// Moment buffers grow to the group size on the first step.
pub struct AdamF32 {
    cfg: AdamConfig,
    t: u32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl AdamF32 {
    pub fn new(cfg: AdamConfig) -> Self {
        Self {
            cfg,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn step(&mut self, weights: &mut [f32], grads: &[f32]) {
        assert_eq!(weights.len(), grads.len());
        self.m.resize(weights.len(), 0.0);
        self.v.resize(weights.len(), 0.0);

        self.t += 1;
        let AdamConfig { lr, beta1, beta2, eps } = self.cfg;
        let (bias1, bias2) = bias_corrections(&self.cfg, self.t);

        for (((w, &g), m), v) in weights
            .iter_mut()
            .zip(grads)
            .zip(&mut self.m)
            .zip(&mut self.v)
        {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *w -= lr * (*m / bias1) / ((*v / bias2).sqrt() + eps);
        }
    }
}

/// `1 - β^t` for both moments.
fn bias_corrections(cfg: &AdamConfig, t: u32) -> (f32, f32) {
    let t = t as f32;
    (1.0 - cfg.beta1.powf(t), 1.0 - cfg.beta2.powf(t))
}

/// Adam over fixed-size vectors (means are `D = 2`, raw covariances `D = 3`).
pub struct AdamVec<const D: usize> {
    cfg: AdamConfig,
    t: u32,
    m: Vec<SVector<f32, D>>,
    v: Vec<SVector<f32, D>>,
}

impl<const D: usize> AdamVec<D> {
    pub fn new(cfg: AdamConfig) -> Self {
        Self {
            cfg,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn step(&mut self, params: &mut [SVector<f32, D>], grads: &[SVector<f32, D>]) {
        assert_eq!(params.len(), grads.len());
        self.m.resize(params.len(), SVector::zeros());
        self.v.resize(params.len(), SVector::zeros());

        self.t += 1;
        let AdamConfig { lr, beta1, beta2, eps } = self.cfg;
        let (bias1, bias2) = bias_corrections(&self.cfg, self.t);

        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(&mut self.m)
            .zip(&mut self.v)
        {
            *m = *m * beta1 + g * (1.0 - beta1);
            *v = *v * beta2 + g.component_mul(g) * (1.0 - beta2);

            // elementwise update
            for k in 0..D {
                p[k] -= lr * (m[k] / bias1) / ((v[k] / bias2).sqrt() + eps);
            }
        }
    }
}

/// Adam state for a whole `GaussianField`.
pub struct FieldOptimizer {
    means: AdamVec<2>,
    covariances: AdamVec<3>,
    weights: AdamF32,
}

impl FieldOptimizer {
    pub fn new(cfg: &AdamConfig) -> Self {
        Self {
            means: AdamVec::new(*cfg),
            covariances: AdamVec::new(*cfg),
            weights: AdamF32::new(*cfg),
        }
    }

    /// Apply one update to every parameter of `field`.
    pub fn step(&mut self, field: &mut GaussianField, grads: &FieldGrads) {
        let (means, covariances, weights) = field.params_mut();
        self.means.step(means, &grads.d_means);
        self.covariances.step(covariances, &grads.d_raw_covariances);
        self.weights.step(weights, &grads.d_weights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CovarianceMode;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn test_adam_vec_basic_update() {
        let mut opt = AdamVec::<3>::new(AdamConfig::default());

        let mut params = vec![Vector3::new(1.0, 1.0, 1.0)];
        let grads = vec![Vector3::new(1.0, -1.0, 0.0)];

        let initial = params[0];
        opt.step(&mut params, &grads);

        // Parameters move against the gradient; zero gradient leaves them alone.
        assert!(params[0].x < initial.x);
        assert!(params[0].y > initial.y);
        assert_eq!(params[0].z, initial.z);
    }

    #[test]
    fn test_adam_first_step_magnitude_is_lr() {
        // With bias correction the first step is lr * g/|g| (up to eps).
        let mut opt = AdamF32::new(AdamConfig {
            lr: 0.05,
            ..AdamConfig::default()
        });
        let mut params = vec![1.0f32, 1.0];
        opt.step(&mut params, &[3.0, -0.001]);
        assert!((params[0] - 0.95).abs() < 1e-5);
        assert!((params[1] - 1.05).abs() < 1e-4);
    }

    #[test]
    fn test_weight_moments_follow_group_size() {
        let mut opt = AdamF32::new(AdamConfig::default());
        let mut weights = vec![1.0f32];
        opt.step(&mut weights, &[1.0]);
        assert!(weights[0] < 1.0);
        assert_eq!(opt.t, 1);

        let mut weights = vec![1.0f32, 2.0, 3.0];
        opt.step(&mut weights, &[0.0, 1.0, -1.0]);
        assert_eq!(opt.m.len(), 3);
        assert!(weights[1] < 2.0 && weights[2] > 3.0);
    }

    #[test]
    fn test_field_optimizer_touches_every_group() {
        let mut field = GaussianField::new(
            vec![Vector2::new(1.0, 1.0)],
            vec![Vector3::new(2.0, 2.0, 0.0)],
            vec![0.5],
            CovarianceMode::Full,
        )
        .unwrap();
        let grads = FieldGrads {
            d_means: vec![Vector2::new(1.0, 1.0)],
            d_raw_covariances: vec![Vector3::new(1.0, 1.0, 1.0)],
            d_weights: vec![1.0],
        };
        let mut opt = FieldOptimizer::new(&AdamConfig::default());
        opt.step(&mut field, &grads);
        assert!(field.means()[0].x < 1.0);
        assert!(field.raw_covariances()[0].z < 0.0);
        assert!(field.weights()[0] < 0.5);
    }
}
