//! bf16 helpers for the compute dtype

/// Convert f32 to bf16 bits with round-to-nearest-even
pub fn f32_to_bf16(value: f32) -> u16 {
    if value.is_nan() {
        return 0x7FC0;
    }
    let bits = value.to_bits();
    let rounding_bias = 0x7FFF + ((bits >> 16) & 1);
    (bits.wrapping_add(rounding_bias) >> 16) as u16
}

/// Convert bf16 bits to f32
pub fn bf16_to_f32(value: u16) -> f32 {
    f32::from_bits(u32::from(value) << 16)
}

/// Round an f32 to the nearest bf16-representable value
pub fn round_bf16(value: f32) -> f32 {
    bf16_to_f32(f32_to_bf16(value))
}

/// Round a buffer in place
pub fn round_bf16_slice(values: &mut [f32]) {
    for v in values {
        *v = round_bf16(*v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_values_survive() {
        for v in [0.0f32, 1.0, -2.0, 0.5, 1024.0] {
            assert_eq!(round_bf16(v), v);
        }
    }

    #[test]
    fn test_relative_error_bounded() {
        for i in 1..1000 {
            let v = i as f32 * 0.0137;
            let r = round_bf16(v);
            assert!(((v - r) / v).abs() <= 1.0 / 256.0);
        }
    }

    #[test]
    fn test_nan_stays_nan() {
        assert!(round_bf16(f32::NAN).is_nan());
    }
}
