//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use ndarray::Array1;

/// SGD optimizer with optional momentum
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocity: Option<Array1<f32>>,
}

impl Sgd {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self { lr, momentum, velocity: None }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut Array1<f32>, grad: &Array1<f32>) {
        if self.momentum > 0.0 {
            // v = momentum * v - lr * grad
            let velocity = match self.velocity.take() {
                Some(v) => v * self.momentum - grad * self.lr,
                None => grad * (-self.lr),
            };
            *params += &velocity;
            self.velocity = Some(velocity);
        } else {
            // Simple SGD: param -= lr * grad
            params.scaled_add(-self.lr, grad);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}
