//! PEFT-compatible adapter export (adapter_model.safetensors + adapter_config.json)
//!
//! Produces output compatible with `peft.PeftModel.from_pretrained()`, and
//! reads it back into the reference model.

use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

use super::error::AdapterError;
use super::peft_config::{PeftAdapterConfig, ADAPTER_CONFIG_FILE};
use crate::lora::{inject_adapters, LoraConfig};
use crate::model::{read_safetensors, take_matrix, write_safetensors, CausalLm, Projection};

/// File name of the adapter weights
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

/// Adapter matrices of one module
#[derive(Debug, Clone, PartialEq)]
struct AdapterWeights {
    /// LoRA A matrix [rank, d_in]
    lora_a: Array2<f32>,
    /// LoRA B matrix [d_out, rank]
    lora_b: Array2<f32>,
}

/// A bundle of LoRA adapters keyed by module path
#[derive(Debug, Clone)]
pub struct PeftAdapterBundle {
    /// Adapters keyed by module path (e.g., "model.layers.0.q_proj")
    adapters: Vec<(String, AdapterWeights)>,
    config: LoraConfig,
    base_model: Option<String>,
}

fn tensor_name(module: &str, matrix: &str) -> String {
    format!("base_model.model.{module}.{matrix}.weight")
}

impl PeftAdapterBundle {
    /// Create an empty bundle with the given LoRA config
    pub fn new(config: LoraConfig) -> Self {
        Self { adapters: Vec::new(), config, base_model: None }
    }

    /// Collect every adapter of `model`
    pub fn from_model(model: &CausalLm, config: &LoraConfig) -> Self {
        let adapters = model
            .lora_modules()
            .into_iter()
            .map(|(name, lora)| {
                (name, AdapterWeights { lora_a: lora.lora_a().clone(), lora_b: lora.lora_b().clone() })
            })
            .collect();
        Self { adapters, config: config.clone(), base_model: None }
    }

    /// Set the base model name
    #[must_use]
    pub fn with_base_model(mut self, name: impl Into<String>) -> Self {
        self.base_model = Some(name.into());
        self
    }

    pub fn config(&self) -> &LoraConfig {
        &self.config
    }

    pub fn base_model(&self) -> Option<&str> {
        self.base_model.as_deref()
    }

    /// Module paths in the bundle
    pub fn module_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Save PEFT-compatible adapter to output directory
    ///
    /// Creates:
    /// - `adapter_config.json` - PEFT configuration
    /// - `adapter_model.safetensors` - adapter weights in PEFT naming convention
    pub fn save_peft(&self, output_dir: impl AsRef<Path>) -> Result<(), AdapterError> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let peft_config = PeftAdapterConfig::from_lora_config(&self.config, self.base_model.as_deref());
        std::fs::write(output_dir.join(ADAPTER_CONFIG_FILE), peft_config.to_json()?)?;

        // PEFT naming convention: "base_model.model.{module}.lora_A.weight" / "lora_B.weight"
        let mut tensors = Vec::with_capacity(self.adapters.len() * 2);
        for (module, weights) in &self.adapters {
            tensors.push((tensor_name(module, "lora_A"), weights.lora_a.clone()));
            tensors.push((tensor_name(module, "lora_B"), weights.lora_b.clone()));
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("format".to_string(), "pt".to_string());
        write_safetensors(&output_dir.join(ADAPTER_WEIGHTS_FILE), &tensors, metadata)?;

        tracing::debug!(dir = %output_dir.display(), modules = self.adapters.len(), "adapter saved");
        Ok(())
    }

    /// Read a bundle saved by [`Self::save_peft`]
    pub fn load_peft(dir: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let dir = dir.as_ref();
        let json = std::fs::read_to_string(dir.join(ADAPTER_CONFIG_FILE))?;
        let peft_config = PeftAdapterConfig::from_json(&json)?;
        let config = peft_config.to_lora_config().map_err(AdapterError::PeftFormatError)?;

        let mut tensors = read_safetensors(&dir.join(ADAPTER_WEIGHTS_FILE))?;
        let mut modules: Vec<String> = tensors
            .keys()
            .filter_map(|k| k.strip_prefix("base_model.model.")?.strip_suffix(".lora_A.weight"))
            .map(str::to_string)
            .collect();
        modules.sort();

        let mut adapters = Vec::with_capacity(modules.len());
        for module in modules {
            let a_name = tensor_name(&module, "lora_A");
            let b_name = tensor_name(&module, "lora_B");
            let a_shape = tensors.get(&a_name).map(|(s, _)| s.clone()).unwrap_or_default();
            let b_shape = tensors
                .get(&b_name)
                .map(|(s, _)| s.clone())
                .ok_or_else(|| AdapterError::PeftFormatError(format!("missing {b_name}")))?;
            if a_shape.len() != 2 || b_shape.len() != 2 || a_shape[0] != config.r || b_shape[1] != config.r {
                return Err(AdapterError::DimensionMismatch {
                    name: module,
                    expected: vec![config.r],
                    actual: [a_shape, b_shape].concat(),
                });
            }
            let lora_a = take_matrix(&mut tensors, &a_name, a_shape[0], a_shape[1])?;
            let lora_b = take_matrix(&mut tensors, &b_name, b_shape[0], b_shape[1])?;
            adapters.push((module, AdapterWeights { lora_a, lora_b }));
        }

        Ok(Self { adapters, config, base_model: peft_config.base_model_name_or_path })
    }

    /// Attach the bundle's adapters to a model without adapters
    ///
    /// The model afterwards computes exactly what the saved model computed.
    pub fn apply_to(&self, model: &mut CausalLm, seed: u64) -> Result<(), AdapterError> {
        let injected = inject_adapters(model, &self.config, seed)
            .map_err(|e| AdapterError::Validation(e.to_string()))?;
        for (module, weights) in &self.adapters {
            if !injected.contains(module) {
                return Err(AdapterError::Validation(format!(
                    "adapter module {module} does not exist in the model"
                )));
            }
            let Some(Projection::Lora(lora)) = model.module_mut(module) else {
                return Err(AdapterError::Validation(format!("module {module} carries no adapter")));
            };
            for (name, target, source) in [
                ("lora_A", lora.lora_a().dim(), weights.lora_a.dim()),
                ("lora_B", lora.lora_b().dim(), weights.lora_b.dim()),
            ] {
                if target != source {
                    return Err(AdapterError::DimensionMismatch {
                        name: tensor_name(module, name),
                        expected: vec![target.0, target.1],
                        actual: vec![source.0, source.1],
                    });
                }
            }
            lora.lora_a_mut().assign(&weights.lora_a);
            lora.lora_b_mut().assign(&weights.lora_b);
        }
        Ok(())
    }

    /// Number of adapter modules in the bundle
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if bundle is empty
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
