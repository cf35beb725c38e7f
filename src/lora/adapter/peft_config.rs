//! PEFT-compatible adapter_config.json generation
//!
//! Generates adapter configuration files compatible with HuggingFace PEFT library,
//! enabling direct loading in `transformers` and `peft` Python packages.

use serde::{Deserialize, Serialize};

use crate::lora::{LoraBias, LoraConfig, TaskType};

/// File name of the adapter configuration
pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// PEFT adapter configuration matching the HuggingFace PEFT schema
///
/// This struct serializes to `adapter_config.json` format that can be loaded by
/// `peft.PeftModel.from_pretrained()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeftAdapterConfig {
    /// PEFT method type (always "LORA" for LoRA adapters)
    pub peft_type: String,
    /// LoRA rank
    pub r: usize,
    /// LoRA alpha scaling parameter
    pub lora_alpha: f32,
    /// Target module names, as configured
    pub target_modules: Vec<String>,
    pub lora_dropout: f32,
    /// Bias handling: "none", "all", or "lora_only"
    pub bias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_name_or_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub fan_in_fan_out: bool,
    #[serde(default)]
    pub inference_mode: bool,
}

impl PeftAdapterConfig {
    /// Convert from a [`LoraConfig`]
    pub fn from_lora_config(config: &LoraConfig, base_model: Option<&str>) -> Self {
        Self {
            peft_type: "LORA".to_string(),
            r: config.r,
            lora_alpha: config.lora_alpha,
            target_modules: config.target_modules.clone(),
            lora_dropout: config.lora_dropout,
            bias: config.bias.as_str().to_string(),
            base_model_name_or_path: base_model.map(String::from),
            task_type: Some(config.task_type.as_str().to_string()),
            fan_in_fan_out: false,
            inference_mode: false,
        }
    }

    /// Back to a [`LoraConfig`]; only LoRA causal-LM adapters without bias are accepted
    pub fn to_lora_config(&self) -> Result<LoraConfig, String> {
        if self.peft_type != "LORA" {
            return Err(format!("peft_type '{}' is not LORA", self.peft_type));
        }
        if self.bias != LoraBias::None.as_str() {
            return Err(format!("bias '{}' is not supported", self.bias));
        }
        match self.task_type.as_deref() {
            None | Some("CAUSAL_LM") => {}
            Some(other) => return Err(format!("task_type '{other}' is not CAUSAL_LM")),
        }
        Ok(LoraConfig {
            r: self.r,
            lora_alpha: self.lora_alpha,
            lora_dropout: self.lora_dropout,
            bias: LoraBias::None,
            task_type: TaskType::CausalLm,
            target_modules: self.target_modules.clone(),
        })
    }

    /// Set inference mode
    #[must_use]
    pub fn with_inference_mode(mut self, inference_mode: bool) -> Self {
        self.inference_mode = inference_mode;
        self
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config() -> LoraConfig {
        LoraConfig::new(16, 32.0, vec!["v_proj".into(), "q_proj".into()]).with_dropout(0.05)
    }

    #[test]
    fn test_from_lora_config() {
        let peft = PeftAdapterConfig::from_lora_config(&run_config(), Some("tiny-lm"));
        assert_eq!(peft.peft_type, "LORA");
        assert_eq!(peft.r, 16);
        assert_eq!(peft.lora_alpha, 32.0);
        assert_eq!(peft.lora_dropout, 0.05);
        assert_eq!(peft.target_modules, vec!["v_proj", "q_proj"]);
        assert_eq!(peft.bias, "none");
        assert_eq!(peft.task_type.as_deref(), Some("CAUSAL_LM"));
        assert_eq!(peft.base_model_name_or_path.as_deref(), Some("tiny-lm"));
    }

    #[test]
    fn test_json_roundtrip_back_to_lora_config() {
        let peft = PeftAdapterConfig::from_lora_config(&run_config(), None);
        let json = peft.to_json().unwrap();
        assert!(!json.contains("base_model_name_or_path"));
        let parsed = PeftAdapterConfig::from_json(&json).unwrap();
        assert_eq!(parsed, peft);
        assert_eq!(parsed.to_lora_config().unwrap(), run_config());
    }

    #[test]
    fn test_foreign_adapters_rejected() {
        let mut peft = PeftAdapterConfig::from_lora_config(&run_config(), None);
        peft.task_type = Some("SEQ_CLS".into());
        assert!(peft.to_lora_config().is_err());
        peft.task_type = None;
        peft.bias = "all".into();
        assert!(peft.to_lora_config().is_err());
    }
}
