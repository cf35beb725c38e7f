//! Loading and saving reference checkpoints
//!
//! A checkpoint directory holds `config.json` and `model.safetensors`, plus
//! optionally the tokenizer files next to them.

use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::weights::{read_safetensors, take_matrix, to_compute_dtype, write_safetensors};
use super::{CausalLm, FrozenWeight, ModelConfig, ModelError, Projection, LM_HEAD, MODEL_TYPE};
use crate::quant::{ComputeDtype, QuantizationConfig};

/// Environment variable with the default model root
pub const MODELS_ENV: &str = "LORA_DP_MODELS";
pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
const EMBED_TOKENS: &str = "model.embed_tokens.weight";

/// Keyword arguments of a model load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub quantization: QuantizationConfig,
    /// Dtype of the weights that stay dense
    pub torch_dtype: ComputeDtype,
    /// Quantize tensors one at a time instead of after the full read
    pub low_cpu_mem_usage: bool,
    /// The reference model keeps no key/value cache; recorded for parity
    pub use_cache: bool,
    /// Accept checkpoints whose `model_type` is not the reference one
    pub trust_remote_code: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            quantization: QuantizationConfig::full_precision(),
            torch_dtype: ComputeDtype::F32,
            low_cpu_mem_usage: false,
            use_cache: true,
            trust_remote_code: false,
        }
    }
}

impl LoadOptions {
    /// Options used for training: quantized, bf16, streaming, no cache, remote code trusted
    pub fn for_training(quantization: QuantizationConfig) -> Self {
        Self {
            quantization,
            torch_dtype: ComputeDtype::Bf16,
            low_cpu_mem_usage: true,
            use_cache: false,
            trust_remote_code: true,
        }
    }
}

/// Resolve a model name to a checkpoint directory
///
/// Tries the name as a path, then below `root`, then below `$LORA_DP_MODELS`.
pub fn resolve_model_dir(name: &str, root: Option<&Path>) -> Result<PathBuf, ModelError> {
    let mut candidates = vec![PathBuf::from(name)];
    if let Some(root) = root {
        candidates.push(root.join(name));
    }
    if let Some(env_root) = std::env::var_os(MODELS_ENV) {
        candidates.push(PathBuf::from(env_root).join(name));
    }
    candidates
        .iter()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .cloned()
        .ok_or_else(|| ModelError::NotFound { name: name.to_string(), tried: candidates })
}

impl CausalLm {
    /// Load a checkpoint by name or path
    pub fn from_pretrained(
        name: &str,
        root: Option<&Path>,
        options: &LoadOptions,
    ) -> Result<Self, ModelError> {
        let dir = resolve_model_dir(name, root)?;
        let config_path = dir.join(CONFIG_FILE);
        let config = ModelConfig::from_file(&config_path)?;
        if config.model_type != MODEL_TYPE {
            if !options.trust_remote_code {
                return Err(ModelError::RemoteCode(format!(
                    "model_type '{}' in {}",
                    config.model_type,
                    config_path.display()
                )));
            }
            tracing::warn!(
                model_type = %config.model_type,
                "loading custom model_type with the reference architecture"
            );
        }

        let mut tensors = read_safetensors(&dir.join(WEIGHTS_FILE))?;
        let (v, h) = (config.vocab_size, config.hidden_size);
        let dense = |w: Array2<f32>| to_compute_dtype(w, options.torch_dtype);
        let frozen = |w: Array2<f32>| {
            if options.quantization.load_in_4bit {
                FrozenWeight::from_dense(w, &options.quantization)
            } else {
                FrozenWeight::Dense(dense(w))
            }
        };

        let embed_tokens = dense(take_matrix(&mut tensors, EMBED_TOKENS, v, h)?);
        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            let mut block = Vec::with_capacity(config.projections.len());
            for p in &config.projections {
                let name = format!("{}.weight", ModelConfig::projection_name(i, p));
                block.push(Projection::Frozen(frozen(take_matrix(&mut tensors, &name, h, h)?)));
            }
            layers.push(block);
        }
        // The head stays dense, as 4-bit loaders skip the output layer
        let head = dense(take_matrix(&mut tensors, &format!("{LM_HEAD}.weight"), v, h)?);
        let lm_head = Projection::Frozen(FrozenWeight::Dense(head));
        if !tensors.is_empty() {
            let mut unused: Vec<&String> = tensors.keys().collect();
            unused.sort();
            tracing::warn!(?unused, "checkpoint tensors not used by the model");
        }

        let model = Self::from_parts(config, embed_tokens, layers, lm_head)?;
        tracing::info!(
            model = name,
            dir = %dir.display(),
            parameters = model.num_parameters(),
            memory_bytes = model.memory_bytes(),
            load_in_4bit = options.quantization.load_in_4bit,
            low_cpu_mem_usage = options.low_cpu_mem_usage,
            use_cache = options.use_cache,
            "model loaded"
        );
        Ok(model)
    }

    /// Write `config.json` and dense `model.safetensors`; adapters are not included
    pub fn save_pretrained(&self, dir: &Path) -> Result<(), ModelError> {
        fs::create_dir_all(dir).map_err(|e| ModelError::io(dir, e))?;
        self.config().save(&dir.join(CONFIG_FILE))?;

        let mut tensors = vec![(EMBED_TOKENS.to_string(), self.embed_tokens().clone())];
        for (name, proj) in self.modules() {
            tensors.push((format!("{name}.weight"), proj.base().to_dense().into_owned()));
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("format".to_string(), "pt".to_string());
        write_safetensors(&dir.join(WEIGHTS_FILE), &tensors, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn saved(dir: &Path) -> CausalLm {
        let model =
            CausalLm::random(ModelConfig::new(20, 8, 2, vec!["q_proj".into(), "v_proj".into()]), 7).unwrap();
        model.save_pretrained(dir).unwrap();
        model
    }

    #[test]
    fn test_full_precision_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let model = saved(tmp.path());
        let loaded =
            CausalLm::from_pretrained(tmp.path().to_str().unwrap(), None, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.forward(&[1, 2, 3]).unwrap(), model.forward(&[1, 2, 3]).unwrap());
    }

    #[test]
    fn test_training_load_quantizes_projections() {
        let tmp = TempDir::new().unwrap();
        let model = saved(tmp.path());
        let options = LoadOptions::for_training(QuantizationConfig::four_bit());
        let loaded = CausalLm::from_pretrained(tmp.path().to_str().unwrap(), None, &options).unwrap();

        let modules = loaded.modules();
        assert!(modules[..4].iter().all(|(_, p)| p.base().is_quantized()));
        assert!(!modules[4].1.base().is_quantized());
        assert!(loaded.memory_bytes() < model.memory_bytes());
        assert_eq!(loaded.num_parameters(), model.num_parameters());
    }

    #[test]
    fn test_resolves_under_root() {
        let tmp = TempDir::new().unwrap();
        saved(&tmp.path().join("tiny-lm"));
        assert!(CausalLm::from_pretrained("tiny-lm", Some(tmp.path()), &LoadOptions::default()).is_ok());
        match CausalLm::from_pretrained("absent-lm", Some(tmp.path()), &LoadOptions::default()) {
            Err(ModelError::NotFound { name, tried }) => {
                assert_eq!(name, "absent-lm");
                assert!(tried.contains(&tmp.path().join("absent-lm")));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_model_type_needs_trust() {
        let tmp = TempDir::new().unwrap();
        let model = saved(tmp.path());
        let mut config = model.config().clone();
        config.model_type = "llama".into();
        config.save(&tmp.path().join(CONFIG_FILE)).unwrap();

        let path = tmp.path().to_str().unwrap();
        assert!(matches!(
            CausalLm::from_pretrained(path, None, &LoadOptions::default()),
            Err(ModelError::RemoteCode(_))
        ));
        let trusted = LoadOptions { trust_remote_code: true, ..LoadOptions::default() };
        assert!(CausalLm::from_pretrained(path, None, &trusted).is_ok());
    }

    #[test]
    fn test_missing_tensor_reported() {
        let tmp = TempDir::new().unwrap();
        let model = saved(tmp.path());
        let mut config = model.config().clone();
        config.num_hidden_layers = 3;
        config.save(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(matches!(
            CausalLm::from_pretrained(tmp.path().to_str().unwrap(), None, &LoadOptions::default()),
            Err(ModelError::MissingTensor(name)) if name == "model.layers.2.q_proj.weight"
        ));
    }
}
