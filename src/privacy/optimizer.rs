//! Differentially private optimizer wrapper.
//!
//! Wraps any optimizer with DP guarantees by:
//! 1. Per-sample gradient clipping
//! 2. Adding calibrated Gaussian noise once per optimizer step
//! 3. Privacy accounting

use ndarray::Array1;
use rand::rngs::StdRng;

use super::accountant::RdpAccountant;
use super::gradient::{add_gaussian_noise, clip_gradient};
use crate::optim::{grad_norm, GradientOptimizer, Optimizer, StepReport};

/// Noise and sampling parameters of a private optimizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpOptimizerConfig {
    pub noise_multiplier: f64,
    /// Per-sample clipping bound C
    pub max_grad_norm: f64,
    /// Expected examples per micro-batch
    pub expected_batch_size: usize,
    /// Micro-batches summed into one optimizer step
    pub accumulation_steps: usize,
    /// Probability that an example takes part in one optimizer step
    pub sample_rate: f64,
    pub delta: f64,
}

impl DpOptimizerConfig {
    /// Noise standard deviation σC
    pub fn noise_std(&self) -> f64 {
        self.noise_multiplier * self.max_grad_norm
    }
}

/// Differentially private optimizer
pub struct DpOptimizer {
    inner: Box<dyn Optimizer>,
    config: DpOptimizerConfig,
    accountant: RdpAccountant,
    summed: Option<Array1<f32>>,
    samples: usize,
    clipped: usize,
    rng: StdRng,
}

impl DpOptimizer {
    pub fn new(inner: Box<dyn Optimizer>, config: DpOptimizerConfig, rng: StdRng) -> Self {
        Self {
            inner,
            config,
            accountant: RdpAccountant::new(),
            summed: None,
            samples: 0,
            clipped: 0,
            rng,
        }
    }

    pub fn config(&self) -> &DpOptimizerConfig {
        &self.config
    }

    pub fn accountant(&self) -> &RdpAccountant {
        &self.accountant
    }

    /// Epsilon spent so far at the configured delta
    pub fn epsilon(&self) -> f64 {
        self.accountant.get_epsilon(self.config.delta)
    }
}

impl GradientOptimizer for DpOptimizer {
    fn accumulate(&mut self, grad: &Array1<f32>) {
        let mut grad = grad.clone();
        if clip_gradient(&mut grad, self.config.max_grad_norm as f32) {
            self.clipped += 1;
        }
        match &mut self.summed {
            Some(sum) => *sum += &grad,
            None => self.summed = Some(grad),
        }
        self.samples += 1;
    }

    fn step(&mut self, params: &mut Array1<f32>) -> StepReport {
        let lr = self.inner.lr();
        let mut grad = self.summed.take().unwrap_or_else(|| Array1::zeros(params.len()));
        let denominator = (self.config.expected_batch_size * self.config.accumulation_steps).max(1) as f32;
        let grad_norm = grad_norm(&grad) / denominator;

        // Noise is added once per step even when sampling produced no examples
        add_gaussian_noise(&mut grad, self.config.noise_std(), &mut self.rng);
        grad /= denominator;
        self.inner.step(params, &grad);
        self.accountant.step(self.config.noise_multiplier, self.config.sample_rate);

        let report = StepReport { samples: self.samples, grad_norm, lr, clipped: self.clipped };
        self.samples = 0;
        self.clipped = 0;
        tracing::trace!(
            samples = report.samples,
            clipped = report.clipped,
            epsilon = self.epsilon(),
            "private step"
        );
        report
    }

    fn zero_grad(&mut self) {
        self.summed = None;
        self.samples = 0;
        self.clipped = 0;
    }

    fn pending_samples(&self) -> usize {
        self.samples
    }

    fn lr(&self) -> f32 {
        self.inner.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    fn privacy_spent(&self) -> Option<(f64, f64)> {
        Some((self.epsilon(), self.config.delta))
    }

    fn into_inner(self: Box<Self>) -> Box<dyn Optimizer> {
        self.inner
    }
}
