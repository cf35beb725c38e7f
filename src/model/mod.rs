//! Reference causal language model
//!
//! A compact decoder whose linear modules are named like those of common
//! causal LMs (`model.layers.{i}.q_proj`, `lm_head`), so adapter targets and
//! PEFT exports carry over. Frozen projection weights can be held 4-bit.

mod causal_lm;
mod config;
mod error;
mod loader;
mod weights;

pub use causal_lm::{CausalLm, LossOutput, Projection, SampleGrad, LM_HEAD};
pub use config::{ModelConfig, MODEL_TYPE};
pub use error::ModelError;
pub use loader::{resolve_model_dir, LoadOptions, CONFIG_FILE, MODELS_ENV, WEIGHTS_FILE};
pub use weights::{read_safetensors, take_matrix, to_compute_dtype, write_safetensors, FrozenWeight, TensorMap};
