//! Dataset loading and splitting
//!
//! Datasets are local JSON-lines (or JSON array) files of objects, addressed
//! by name the way a hub dataset would be:
//!
//! - a file path: `data/imdb.jsonl`
//! - a directory holding `<split>.jsonl` or `<split>.json`
//! - either of the above under a dataset root (`dataset.root` or
//!   `LORA_DP_DATASETS`)

mod dataset;
mod split;

pub use dataset::{load_dataset, Dataset, Row, DATASETS_ENV};
pub use split::{split_for_run, RunSplit, TrainTestSplit, EVAL_FRACTION, SPLIT_SEED};

use std::path::PathBuf;

/// Errors from dataset loading and splitting
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Dataset '{name}' not found (tried: {})", display_paths(.tried))]
    NotFound { name: String, tried: Vec<PathBuf> },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path} at line {line}: {message}")]
    InvalidJson { path: PathBuf, line: usize, message: String },

    #[error("Row {line} of {path} is not a JSON object")]
    NotAnObject { path: PathBuf, line: usize },

    #[error("Dataset '{0}' has no rows")]
    Empty(String),

    #[error("Cannot split {n} rows with test_size={test_size}: {message}")]
    InvalidSplit { n: usize, test_size: f64, message: String },

    #[error("Row {row} has no field '{field}'")]
    MissingField { field: String, row: usize },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}
