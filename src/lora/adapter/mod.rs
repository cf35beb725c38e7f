//! LoRA adapter serialization
//!
//! - PEFT-compatible export (`adapter_config.json` + `adapter_model.safetensors`)
//! - loading a saved adapter onto a base model

mod error;
mod peft_config;
mod peft_export;

pub use error::AdapterError;
pub use peft_config::{PeftAdapterConfig, ADAPTER_CONFIG_FILE};
pub use peft_export::{PeftAdapterBundle, ADAPTER_WEIGHTS_FILE};
