//! Tokenizer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Tokenizer, formatting and collation errors
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Invalid token ID: {0}")]
    InvalidTokenId(u32),

    #[error("Tokenizer file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load tokenizer from {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Invalid prompt template {template:?}: {message}")]
    Template { template: String, message: String },

    #[error("Row {row} has no usable field '{field}'")]
    MissingField { field: String, row: usize },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for tokenizer operations
pub type Result<T> = std::result::Result<T, TokenizerError>;
