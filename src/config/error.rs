//! Configuration error types

use std::path::PathBuf;

/// Errors raised while composing or validating a run configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid override '{0}': expected key=value, +key=value, ++key=value or ~key")]
    InvalidOverride(String),

    #[error("Could not override '{0}': key not found (use +{0}=... to add it)")]
    MissingKey(String),

    #[error("Could not append '{0}': key already exists (use {0}=... to override it)")]
    KeyExists(String),

    #[error("Could not delete '{0}': key not found")]
    DeleteMissing(String),

    #[error("Configuration does not match schema: {0}")]
    Schema(String),

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}
