//! Reference model configuration (`config.json`)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::ModelError;

/// `model_type` written by this crate
pub const MODEL_TYPE: &str = "lora-dp-reference";

/// Architecture hyperparameters stored in `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    /// Square projections applied in order inside every block
    pub projections: Vec<String>,
    /// Storage dtype of the checkpoint
    #[serde(default = "default_dtype")]
    pub torch_dtype: String,
}

fn default_model_type() -> String {
    MODEL_TYPE.to_string()
}

fn default_dtype() -> String {
    "float32".to_string()
}

impl ModelConfig {
    pub fn new(
        vocab_size: usize,
        hidden_size: usize,
        num_hidden_layers: usize,
        projections: Vec<String>,
    ) -> Self {
        Self {
            model_type: default_model_type(),
            vocab_size,
            hidden_size,
            num_hidden_layers,
            projections,
            torch_dtype: default_dtype(),
        }
    }

    /// Read and check `config.json`
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ModelError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate().map_err(|message| ModelError::Config { path: path.to_path_buf(), message })?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ModelError::Config { path: path.to_path_buf(), message: e.to_string() })?;
        fs::write(path, text).map_err(|e| ModelError::io(path, e))
    }

    fn validate(&self) -> Result<(), String> {
        if self.vocab_size == 0 || self.hidden_size == 0 {
            return Err("vocab_size and hidden_size must be > 0".to_string());
        }
        if self.projections.iter().any(|p| p.is_empty() || p.contains('.')) {
            return Err(format!("invalid projection names {:?}", self.projections));
        }
        Ok(())
    }

    /// Fully qualified name of a block projection
    pub fn projection_name(layer: usize, projection: &str) -> String {
        format!("model.layers.{layer}.{projection}")
    }

    /// Every linear module in forward order, `lm_head` last
    pub fn linear_module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (0..self.num_hidden_layers)
            .flat_map(|i| self.projections.iter().map(move |p| Self::projection_name(i, p)))
            .collect();
        names.push("lm_head".to_string());
        names
    }
}
