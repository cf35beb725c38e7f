//! Training and evaluation results

use serde::{Deserialize, Serialize};

/// exp of a mean cross-entropy
pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}

/// Result of [`super::SftTrainer::train`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutput {
    pub global_step: u64,
    /// Mean per-example loss over the whole run
    pub training_loss: f64,
    /// Epsilon spent, for private runs
    pub epsilon: Option<f64>,
    pub delta: Option<f64>,
    pub runtime_secs: f64,
    pub samples_per_second: f64,
}

/// Result of [`super::SftTrainer::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean per-example loss
    pub eval_loss: f64,
    pub perplexity: f64,
    pub samples: usize,
    /// Label tokens scored
    pub tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_perplexity() {
        assert_abs_diff_eq!(perplexity(0.0), 1.0);
        assert_abs_diff_eq!(perplexity(2.0_f64.ln()), 2.0, epsilon = 1e-12);
    }
}
