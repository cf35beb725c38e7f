//! LoRA configuration

use serde::{Deserialize, Serialize};

use super::LoraError;
use crate::config::RunConfig;

/// Rank used for every run
pub const LORA_RANK: usize = 16;
/// Alpha used for every run
pub const LORA_ALPHA: f32 = 32.0;
/// Dropout on the adapter input used for every run
pub const LORA_DROPOUT: f32 = 0.05;

/// Which biases are trained alongside the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraBias {
    #[default]
    None,
    All,
    LoraOnly,
}

impl LoraBias {
    pub fn as_str(self) -> &'static str {
        match self {
            LoraBias::None => "none",
            LoraBias::All => "all",
            LoraBias::LoraOnly => "lora_only",
        }
    }
}

/// Task the adapted model is trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskType {
    #[default]
    #[serde(rename = "CAUSAL_LM")]
    CausalLm,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::CausalLm => "CAUSAL_LM",
        }
    }
}

/// Adapter hyperparameters and placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    /// Rank of the decomposition
    pub r: usize,
    /// Scaling numerator; the update is scaled by `lora_alpha / r`
    pub lora_alpha: f32,
    /// Dropout applied to the adapter input while training
    pub lora_dropout: f32,
    pub bias: LoraBias,
    pub task_type: TaskType,
    /// Module names, matched exactly or as a `.`-separated suffix
    pub target_modules: Vec<String>,
}

impl LoraConfig {
    pub fn new(r: usize, lora_alpha: f32, target_modules: Vec<String>) -> Self {
        Self {
            r,
            lora_alpha,
            lora_dropout: 0.0,
            bias: LoraBias::None,
            task_type: TaskType::CausalLm,
            target_modules,
        }
    }

    #[must_use]
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.lora_dropout = dropout;
        self
    }

    /// `lora_alpha / r`
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.lora_alpha / self.r as f32
    }

    /// Whether `module_name` is a target
    #[must_use]
    pub fn matches(&self, module_name: &str) -> bool {
        self.target_modules.iter().any(|target| {
            module_name == target
                || module_name
                    .strip_suffix(target.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn validate(&self) -> Result<(), LoraError> {
        if self.r == 0 {
            return Err(LoraError::InvalidRank(self.r));
        }
        if !(0.0..1.0).contains(&self.lora_dropout) {
            return Err(LoraError::InvalidDropout(self.lora_dropout));
        }
        if self.bias != LoraBias::None {
            return Err(LoraError::UnsupportedBias(self.bias.as_str().to_string()));
        }
        if self.target_modules.is_empty() {
            return Err(LoraError::TargetModulesNotFound {
                targets: Vec::new(),
                available: Vec::new(),
            });
        }
        Ok(())
    }
}

/// Adapter configuration for a run: r=16, alpha=32, dropout=0.05, no bias,
/// causal LM, target modules taken verbatim from `model.lora.target_modules`
pub fn build_lora_config(config: &RunConfig) -> LoraConfig {
    LoraConfig {
        r: LORA_RANK,
        lora_alpha: LORA_ALPHA,
        lora_dropout: LORA_DROPOUT,
        bias: LoraBias::None,
        task_type: TaskType::CausalLm,
        target_modules: config.model.lora.target_modules.clone(),
    }
}
