//! LoRA (Low-Rank Adaptation) implementation
//!
//! LoRA enables parameter-efficient fine-tuning of large pretrained models
//! by adding trainable low-rank decomposition matrices to frozen weights.
//! Frozen weights may be stored 4-bit (QLoRA); adapters stay in f32.

mod adapter;
mod config;
mod error;
mod inject;
mod layer;

pub use adapter::{AdapterError, PeftAdapterBundle, PeftAdapterConfig, ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE};
pub use config::{build_lora_config, LoraBias, LoraConfig, TaskType, LORA_ALPHA, LORA_DROPOUT, LORA_RANK};
pub use error::LoraError;
pub use inject::inject_adapters;
pub use layer::{LoraCache, LoraGrads, LoraLinear};
