//! AdamW optimizer (Adam with decoupled Weight decay)

use super::Optimizer;
use ndarray::{Array1, Zip};

/// AdamW optimizer
///
/// AdamW decouples weight decay from the gradient-based update, making it more
/// effective than L2 regularization. Instead of adding weight decay to the gradient,
/// it applies weight decay directly to the parameters.
///
/// AdamW: θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
#[derive(Debug, Clone)]
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Option<Array1<f32>>, // First moment
    v: Option<Array1<f32>>, // Second moment
}

impl AdamW {
    /// Create a new AdamW optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, weight_decay, t: 0, m: None, v: None }
    }

    /// Create AdamW with the usual fine-tuning defaults (no weight decay)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, 0.0)
    }

    /// Get optimizer step counter.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    #[must_use]
    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    #[must_use]
    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    #[must_use]
    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut Array1<f32>, grad: &Array1<f32>) {
        let n = params.len();
        let m = self.m.get_or_insert_with(|| Array1::zeros(n));
        let v = self.v.get_or_insert_with(|| Array1::zeros(n));
        self.t += 1;

        // Bias correction factors
        let t = self.t as i32;
        let lr_t = self.lr * ((1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t)));
        let decay = 1.0 - self.lr * self.weight_decay;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);

        Zip::from(params).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
            // m_t = β1 * m_{t-1} + (1 - β1) * g
            *m = beta1 * *m + (1.0 - beta1) * g;
            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p = *p * decay - lr_t * *m / (v.sqrt() + eps);
        });
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &'static str {
        "adamw"
    }
}
