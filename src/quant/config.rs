//! Quantization configuration for loading frozen base weights

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// 4-bit codebook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantType {
    /// Sign plus e2m1 float levels (bitsandbytes default)
    #[default]
    Fp4,
    /// Symmetric integer levels in [-7, 7]
    Int4,
    /// Normal-float levels (QLoRA)
    Nf4,
}

/// Dtype used for computation and for non-quantized weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDtype {
    #[default]
    F32,
    Bf16,
}

/// Quantization request handed to the model loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationConfig {
    /// Store projection weights in 4-bit
    pub load_in_4bit: bool,
    /// Codebook for the 4-bit codes
    #[serde(default)]
    pub quant_type: QuantType,
    /// Dtype used when dequantizing
    #[serde(default)]
    pub compute_dtype: ComputeDtype,
    /// Quantize the block scales as well
    #[serde(default)]
    pub double_quant: bool,
}

impl QuantizationConfig {
    /// Plain 4-bit request with library defaults
    pub fn four_bit() -> Self {
        Self {
            load_in_4bit: true,
            quant_type: QuantType::default(),
            compute_dtype: ComputeDtype::default(),
            double_quant: false,
        }
    }

    /// Dense f32 storage, used for freshly initialised models
    pub fn full_precision() -> Self {
        Self {
            load_in_4bit: false,
            quant_type: QuantType::default(),
            compute_dtype: ComputeDtype::F32,
            double_quant: false,
        }
    }

    /// Bits per stored projection weight
    pub fn bits(&self) -> u8 {
        if self.load_in_4bit {
            4
        } else {
            32
        }
    }
}

/// Quantization for a run: always 4-bit, whatever else the configuration says.
pub fn build_quantization_config(_config: &RunConfig) -> QuantizationConfig {
    QuantizationConfig::four_bit()
}
