//! Crate-level error type
//!
//! Each module owns a narrow error enum; this type composes them so the
//! pipeline and the CLI can propagate any failure with `?`.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataError;
use crate::lora::{AdapterError, LoraError};
use crate::model::ModelError;
use crate::privacy::DpError;
use crate::tokenizer::TokenizerError;
use crate::tracking::TrackingError;

/// Result type alias for lora-dp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Lora(#[from] LoraError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Privacy(#[from] DpError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("Training error: {0}")]
    Training(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }
}
