//! LoRA injection and layer errors

use thiserror::Error;

/// Errors from adapter configuration and injection
#[derive(Error, Debug)]
pub enum LoraError {
    #[error("Target modules {targets:?} not found in the base model (available: {available:?})")]
    TargetModulesNotFound { targets: Vec<String>, available: Vec<String> },

    #[error("Invalid LoRA rank: {0} (must be > 0)")]
    InvalidRank(usize),

    #[error("Invalid LoRA dropout: {0} (must be in [0.0, 1.0))")]
    InvalidDropout(f32),

    #[error("Unsupported bias mode '{0}': only 'none' is supported")]
    UnsupportedBias(String),

    #[error("Module {0} already carries an adapter")]
    AlreadyInjected(String),

    #[error("Trainable parameter length mismatch: expected {expected}, got {actual}")]
    ParameterLength { expected: usize, actual: usize },
}
