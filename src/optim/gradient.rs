//! Per-sample gradient aggregation in front of an [`Optimizer`]
//!
//! The trainer hands every example's gradient to a [`GradientOptimizer`] and
//! calls [`GradientOptimizer::step`] once per optimizer step. The standard
//! implementation averages; the private one in `crate::privacy` clips each
//! example and adds noise before stepping.

use ndarray::Array1;

use super::clip::clip_grad_norm;
use super::Optimizer;

/// What an optimizer step did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Examples aggregated into the step
    pub samples: usize,
    /// Norm of the gradient handed to the inner optimizer, before any global clipping
    pub grad_norm: f32,
    /// Learning rate used
    pub lr: f32,
    /// Examples whose gradient was clipped
    pub clipped: usize,
}

/// Aggregates per-sample gradients and updates the parameters
pub trait GradientOptimizer: Send {
    /// Add one example's gradient to the pending step
    fn accumulate(&mut self, grad: &Array1<f32>);

    /// Update `params` from the pending gradients and clear them
    fn step(&mut self, params: &mut Array1<f32>) -> StepReport;

    /// Drop pending gradients
    fn zero_grad(&mut self);

    /// Examples accumulated since the last step
    fn pending_samples(&self) -> usize;

    fn lr(&self) -> f32;

    fn set_lr(&mut self, lr: f32);

    /// `(epsilon, delta)` spent so far, for private optimizers
    fn privacy_spent(&self) -> Option<(f64, f64)> {
        None
    }

    /// Give back the wrapped optimizer
    fn into_inner(self: Box<Self>) -> Box<dyn Optimizer>;
}

/// Mean of the pending gradients, with optional global-norm clipping
pub struct StandardOptimizer {
    inner: Box<dyn Optimizer>,
    sum: Option<Array1<f32>>,
    samples: usize,
    /// `0.0` disables clipping
    max_grad_norm: f32,
}

impl StandardOptimizer {
    pub fn new(inner: Box<dyn Optimizer>, max_grad_norm: f32) -> Self {
        Self { inner, sum: None, samples: 0, max_grad_norm }
    }
}

impl GradientOptimizer for StandardOptimizer {
    fn accumulate(&mut self, grad: &Array1<f32>) {
        match &mut self.sum {
            Some(sum) => *sum += grad,
            None => self.sum = Some(grad.clone()),
        }
        self.samples += 1;
    }

    fn step(&mut self, params: &mut Array1<f32>) -> StepReport {
        let lr = self.inner.lr();
        let samples = self.samples;
        let Some(mut grad) = self.sum.take() else {
            return StepReport { samples: 0, grad_norm: 0.0, lr, clipped: 0 };
        };
        grad /= samples as f32;
        let (grad_norm, clipped) = if self.max_grad_norm > 0.0 {
            let norm = clip_grad_norm(&mut grad, self.max_grad_norm);
            (norm, usize::from(norm > self.max_grad_norm))
        } else {
            (super::grad_norm(&grad), 0)
        };
        self.inner.step(params, &grad);
        self.samples = 0;
        StepReport { samples, grad_norm, lr, clipped }
    }

    fn zero_grad(&mut self) {
        self.sum = None;
        self.samples = 0;
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

    fn into_inner(self: Box<Self>) -> Box<dyn Optimizer> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Sgd;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_averages_pending_gradients() {
        let mut opt = StandardOptimizer::new(Box::new(Sgd::new(1.0, 0.0)), 0.0);
        let mut params = arr1(&[0.0, 0.0]);
        opt.accumulate(&arr1(&[1.0, 2.0]));
        opt.accumulate(&arr1(&[3.0, 0.0]));
        assert_eq!(opt.pending_samples(), 2);
        let report = opt.step(&mut params);
        assert_eq!(report.samples, 2);
        assert_eq!(params, arr1(&[-2.0, -1.0]));
        assert_eq!(opt.pending_samples(), 0);
        assert!(opt.privacy_spent().is_none());
    }

    #[test]
    fn test_global_clipping() {
        let mut opt = StandardOptimizer::new(Box::new(Sgd::new(1.0, 0.0)), 1.0);
        let mut params = arr1(&[0.0, 0.0]);
        opt.accumulate(&arr1(&[3.0, 4.0]));
        let report = opt.step(&mut params);
        assert_abs_diff_eq!(report.grad_norm, 5.0, epsilon = 1e-6);
        assert_eq!(report.clipped, 1);
        assert_abs_diff_eq!(params[0], -0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_step_is_a_no_op() {
        let mut opt = StandardOptimizer::new(Box::new(Sgd::new(1.0, 0.0)), 1.0);
        let mut params = arr1(&[1.0]);
        opt.accumulate(&arr1(&[1.0]));
        opt.zero_grad();
        assert_eq!(opt.step(&mut params).samples, 0);
        assert_eq!(params, arr1(&[1.0]));
    }

    #[test]
    fn test_into_inner_keeps_lr() {
        let mut opt: Box<dyn GradientOptimizer> =
            Box::new(StandardOptimizer::new(Box::new(Sgd::new(0.1, 0.0)), 1.0));
        opt.set_lr(0.05);
        assert_eq!(opt.into_inner().lr(), 0.05);
    }
}
