//! Model loading and execution errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the reference causal LM
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model '{name}' not found (tried: {tried:?})")]
    NotFound { name: String, tried: Vec<PathBuf> },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config.json at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("SafeTensors error: {0}")]
    SafeTensors(String),

    #[error("Missing weight tensor '{0}'")]
    MissingTensor(String),

    #[error("Tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch { name: String, expected: Vec<usize>, actual: Vec<usize> },

    #[error("Tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Token id {id} out of range for vocabulary of {vocab_size}")]
    TokenOutOfRange { id: u32, vocab_size: usize },

    #[error("Sequence lengths differ: {ids} ids, {mask} mask, {labels} labels")]
    LengthMismatch { ids: usize, mask: usize, labels: usize },

    #[error("Model does not load with trust_remote_code=false: {0}")]
    RemoteCode(String),
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
