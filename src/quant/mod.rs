//! Quantization for QLoRA
//!
//! - 4-bit block-wise quantization of frozen projection weights
//! - bf16 rounding for the compute dtype
//! - the quantization request passed to the model loader

mod config;
mod precision;
mod quant4bit;

pub use config::{build_quantization_config, ComputeDtype, QuantType, QuantizationConfig};
pub use precision::{bf16_to_f32, f32_to_bf16, round_bf16, round_bf16_slice};
pub use quant4bit::{dequantize_4bit, quantize_4bit, BlockScales, Quantized4Bit, BLOCK_SIZE, FP4_LEVELS, NF4_LEVELS};
