//! Error types for the differential privacy engine.

use thiserror::Error;

/// DP errors
#[derive(Debug, Error)]
pub enum DpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model cannot be made private: {0}")]
    InvalidModel(String),

    #[error("Gradient computation failed: {0}")]
    GradientError(String),

    #[error("No noise multiplier reaches epsilon {target_epsilon} (best: {best_epsilon:.4} at sigma {sigma})")]
    NoiseCalibration { target_epsilon: f64, best_epsilon: f64, sigma: f64 },
}

/// Result type for DP operations
pub type Result<T> = std::result::Result<T, DpError>;
