//! LoRA adapter errors

use thiserror::Error;

use crate::model::ModelError;

/// LoRA adapter save/load errors
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Adapter validation error: {0}")]
    Validation(String),

    #[error("Dimension mismatch for {name}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch { name: String, expected: Vec<usize>, actual: Vec<usize> },

    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] ModelError),

    #[error("PEFT format error: {0}")]
    PeftFormatError(String),
}
