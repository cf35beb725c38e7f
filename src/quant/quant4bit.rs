//! 4-bit quantization for QLoRA
//!
//! Block-wise absmax quantization of frozen base weights. Each block of
//! [`BLOCK_SIZE`] values keeps one scale and packs two 4-bit codes per byte.
//!
//! Three codebooks are supported:
//! - `Fp4`: sign plus 3-bit e2m1 float levels laid out as in bitsandbytes,
//!   nearest level to x / absmax
//! - `Int4`: symmetric integers, q = round(clamp(x / scale, -7, 7))
//! - `Nf4`: the 16 normal-float levels from the QLoRA paper, nearest level
//!   to x / absmax
//!
//! With double quantization the f32 block scales are themselves quantized to
//! 8 bits against a single f32 super-scale.

use serde::{Deserialize, Serialize};

use super::config::QuantType;

/// Block size for quantization (64 elements per block)
pub const BLOCK_SIZE: usize = 64;

/// FP4 code levels indexed by nibble; bit 3 is the sign
pub const FP4_LEVELS: [f32; 16] = [
    0.0,
    0.005_208_333,
    0.666_666_7,
    1.0,
    0.333_333_34,
    0.5,
    0.166_666_67,
    0.25,
    -0.0,
    -0.005_208_333,
    -0.666_666_7,
    -1.0,
    -0.333_333_34,
    -0.5,
    -0.166_666_67,
    -0.25,
];

/// NF4 code levels, normalized to [-1, 1]
pub const NF4_LEVELS: [f32; 16] = [
    -1.0,
    -0.696_192_8,
    -0.525_073_05,
    -0.394_917_5,
    -0.284_441_38,
    -0.184_773_43,
    -0.091_050_036,
    0.0,
    0.079_580_3,
    0.160_930_2,
    0.246_112_3,
    0.337_915_24,
    0.440_709_83,
    0.562_617,
    0.722_956_84,
    1.0,
];

/// Block scales, either kept in f32 or double-quantized to u8
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum BlockScales {
    /// One f32 scale per block
    Full(Vec<f32>),
    /// Scales quantized to u8 against one f32 super-scale
    Double { codes: Vec<u8>, super_scale: f32 },
}

impl BlockScales {
    fn len(&self) -> usize {
        match self {
            BlockScales::Full(s) => s.len(),
            BlockScales::Double { codes, .. } => codes.len(),
        }
    }

    fn get(&self, block: usize) -> f32 {
        match self {
            BlockScales::Full(s) => s[block],
            BlockScales::Double { codes, super_scale } => f32::from(codes[block]) * super_scale,
        }
    }

    fn memory_bytes(&self) -> usize {
        match self {
            BlockScales::Full(s) => s.len() * 4,
            BlockScales::Double { codes, .. } => codes.len() + 4,
        }
    }
}

/// 4-bit quantized representation with block-wise scale factors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quantized4Bit {
    /// Scale factors (one per block)
    pub scales: BlockScales,
    /// Quantized data: 2 values per byte (4 bits each)
    pub data: Vec<u8>,
    /// Original number of elements
    pub len: usize,
    /// Codebook used for the 4-bit codes
    pub quant_type: QuantType,
}

impl Quantized4Bit {
    /// Get memory usage in bytes
    pub fn memory_bytes(&self) -> usize {
        self.scales.memory_bytes() + self.data.len()
    }

    /// Get compression ratio vs f32
    pub fn compression_ratio(&self) -> f32 {
        let original_bytes = self.len * 4;
        original_bytes as f32 / self.memory_bytes() as f32
    }

    /// Number of quantization blocks
    pub fn num_blocks(&self) -> usize {
        self.scales.len()
    }
}

/// Quantize f32 values to 4-bit with block-wise scaling
pub fn quantize_4bit(values: &[f32], quant_type: QuantType, double_quant: bool) -> Quantized4Bit {
    let len = values.len();
    let num_blocks = len.div_ceil(BLOCK_SIZE);

    let mut scales = Vec::with_capacity(num_blocks);
    let mut data = Vec::with_capacity(len.div_ceil(2));

    for block in values.chunks(BLOCK_SIZE) {
        let absmax = block.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let scale = match quant_type {
            QuantType::Int4 => absmax / 7.0,
            QuantType::Fp4 | QuantType::Nf4 => absmax,
        };
        scales.push(scale);
    }

    // Codes are computed against the scales the dequantizer will see, so
    // double quantization does not bias the nibbles.
    let scales = if double_quant { double_quantize(&scales) } else { BlockScales::Full(scales) };

    for (block_idx, block) in values.chunks(BLOCK_SIZE).enumerate() {
        let scale = scales.get(block_idx);
        for (i, &val) in block.iter().enumerate() {
            let code = encode(val, scale, quant_type);
            let global = block_idx * BLOCK_SIZE + i;
            if global % 2 == 0 {
                data.push(code << 4);
            } else {
                let last = data.len() - 1;
                data[last] |= code;
            }
        }
    }

    Quantized4Bit { scales, data, len, quant_type }
}

/// Dequantize 4-bit values back to f32
pub fn dequantize_4bit(quantized: &Quantized4Bit) -> Vec<f32> {
    let mut result = Vec::with_capacity(quantized.len);
    for idx in 0..quantized.len {
        let byte = quantized.data[idx / 2];
        let nibble = if idx % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        let scale = quantized.scales.get(idx / BLOCK_SIZE);
        result.push(decode(nibble, scale, quantized.quant_type));
    }
    result
}

fn double_quantize(scales: &[f32]) -> BlockScales {
    let max = scales.iter().fold(0.0f32, |m, s| m.max(*s));
    if max == 0.0 {
        return BlockScales::Double { codes: vec![0; scales.len()], super_scale: 0.0 };
    }
    let super_scale = max / 255.0;
    // Round up so a block's absmax never exceeds its reconstructed scale.
    let codes = scales.iter().map(|s| (s / super_scale).ceil().clamp(0.0, 255.0) as u8).collect();
    BlockScales::Double { codes, super_scale }
}

fn encode(val: f32, scale: f32, quant_type: QuantType) -> u8 {
    if scale == 0.0 {
        return match quant_type {
            QuantType::Int4 | QuantType::Fp4 => 0,
            QuantType::Nf4 => 7,
        };
    }
    match quant_type {
        QuantType::Int4 => {
            let q = (val / scale).clamp(-7.0, 7.0).round() as i8;
            (q as u8) & 0x0F
        }
        QuantType::Fp4 => nearest_level(val / scale, &FP4_LEVELS),
        QuantType::Nf4 => nearest_level(val / scale, &NF4_LEVELS),
    }
}

fn nearest_level(normalized: f32, levels: &[f32; 16]) -> u8 {
    let normalized = normalized.clamp(-1.0, 1.0);
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, level) in levels.iter().enumerate() {
        let dist = (normalized - level).abs();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best as u8
}

fn decode(nibble: u8, scale: f32, quant_type: QuantType) -> f32 {
    match quant_type {
        QuantType::Int4 => {
            // Sign extend bit 3
            let q = if nibble & 0x08 != 0 { (nibble | 0xF0) as i8 } else { nibble as i8 };
            f32::from(q) * scale
        }
        QuantType::Fp4 => FP4_LEVELS[usize::from(nibble & 0x0F)] * scale,
        QuantType::Nf4 => NF4_LEVELS[usize::from(nibble & 0x0F)] * scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_int4_dequantize_close() {
        let values = vec![1.0, -2.0, 3.5, -4.2, 0.5, -0.8, 2.1, -1.5];
        let q = quantize_4bit(&values, QuantType::Int4, false);
        let deq = dequantize_4bit(&q);

        assert_eq!(deq.len(), values.len());
        // absmax 4.2 over 7 levels: step 0.6, max error half a step
        for (original, d) in values.iter().zip(deq.iter()) {
            assert!((original - d).abs() <= 0.31, "{original} vs {d}");
        }
    }

    #[test]
    fn test_nf4_extremes_exact() {
        let values = vec![-3.0, 0.0, 3.0, 1.0];
        let q = quantize_4bit(&values, QuantType::Nf4, false);
        let deq = dequantize_4bit(&q);
        assert_abs_diff_eq!(deq[0], -3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(deq[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(deq[2], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fp4_levels_exact_and_sign_bit() {
        let values = vec![-2.0, -1.0, 0.5, 1.0 / 3.0, 2.0];
        let q = quantize_4bit(&values, QuantType::Fp4, false);
        let deq = dequantize_4bit(&q);
        for (original, d) in values.iter().zip(&deq) {
            assert_abs_diff_eq!(*original, *d, epsilon = 1e-5);
        }
        // -2.0 is -absmax: sign bit set over the 1.0 code
        assert_eq!(q.data[0] >> 4, 0b1011);
    }

    #[test]
    fn test_fp4_rounds_to_nearest_level() {
        // 0.4 sits between 1/3 and 1/2 of absmax, nearer 1/3
        let deq = dequantize_4bit(&quantize_4bit(&[1.0, 0.4], QuantType::Fp4, false));
        assert_abs_diff_eq!(deq[1], 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_block() {
        for quant_type in [QuantType::Fp4, QuantType::Int4, QuantType::Nf4] {
            let q = quantize_4bit(&[0.0; 64], quant_type, false);
            for v in dequantize_4bit(&q) {
                assert_abs_diff_eq!(v, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_multiple_blocks_and_odd_length() {
        let values: Vec<f32> = (0..77).map(|i| (i as f32 * 0.1).sin()).collect();
        let q = quantize_4bit(&values, QuantType::Int4, false);
        assert_eq!(q.num_blocks(), 2);
        assert_eq!(q.data.len(), 39);
        assert_eq!(dequantize_4bit(&q).len(), 77);
    }

    #[test]
    fn test_compression_ratio() {
        let q = quantize_4bit(&vec![1.5; 1024], QuantType::Int4, false);
        assert!(q.compression_ratio() > 6.0);

        let dq = quantize_4bit(&vec![1.5; 1024], QuantType::Int4, true);
        assert!(dq.compression_ratio() > q.compression_ratio());
    }

    #[test]
    fn test_double_quant_error_bounded() {
        let values: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.37).cos() * (1.0 + i as f32 / 64.0)).collect();
        let absmax = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let double = dequantize_4bit(&quantize_4bit(&values, QuantType::Nf4, true));
        let err = values.iter().zip(&double).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max);
        // Widest NF4 gap is 0.304, so the error stays under ~0.153 * absmax.
        assert!(err < 0.2 * absmax, "error {err} vs absmax {absmax}");
    }
}
