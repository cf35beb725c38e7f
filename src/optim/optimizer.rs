//! Optimizer trait

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Trait for optimization algorithms over a flat parameter buffer
pub trait Optimizer: Send {
    /// Perform a single optimization step with `grad` as dL/dparams
    fn step(&mut self, params: &mut Array1<f32>, grad: &Array1<f32>);

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    fn name(&self) -> &'static str;
}

/// Optimizer names accepted in `training_arguments.optim`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[default]
    #[serde(rename = "adamw_torch", alias = "adamw_hf", alias = "adamw")]
    AdamW,
    #[serde(rename = "sgd")]
    Sgd,
}
