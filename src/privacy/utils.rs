//! Noise calibration.

use super::accountant::RdpAccountant;
use super::error::{DpError, Result};

const SIGMA_CEILING: f64 = 2048.0;

/// Epsilon after `steps` steps at `(noise_multiplier, sample_rate)`
pub fn epsilon_after(noise_multiplier: f64, sample_rate: f64, steps: usize, delta: f64) -> f64 {
    let mut accountant = RdpAccountant::new();
    accountant.step_many(noise_multiplier, sample_rate, steps);
    accountant.get_epsilon(delta)
}

/// Smallest noise multiplier (within `tolerance` in epsilon) that keeps
/// `steps` steps at `sample_rate` under `target_epsilon`
pub fn get_noise_multiplier(
    target_epsilon: f64,
    delta: f64,
    sample_rate: f64,
    steps: usize,
    tolerance: f64,
) -> Result<f64> {
    if target_epsilon <= 0.0 || !target_epsilon.is_finite() {
        return Err(DpError::InvalidConfig(format!("target_epsilon must be positive, got {target_epsilon}")));
    }
    if delta <= 0.0 || delta >= 1.0 {
        return Err(DpError::InvalidConfig(format!("delta must be in (0, 1), got {delta}")));
    }
    if sample_rate <= 0.0 || sample_rate > 1.0 {
        return Err(DpError::InvalidConfig(format!("sample_rate must be in (0, 1], got {sample_rate}")));
    }

    let mut low = 0.0;
    let mut high = 10.0;
    let mut eps_high = epsilon_after(high, sample_rate, steps, delta);
    while eps_high > target_epsilon {
        if high >= SIGMA_CEILING {
            return Err(DpError::NoiseCalibration { target_epsilon, best_epsilon: eps_high, sigma: high });
        }
        low = high;
        high *= 2.0;
        eps_high = epsilon_after(high, sample_rate, steps, delta);
    }

    // Binary search for noise multiplier
    while target_epsilon - eps_high > tolerance {
        let mid = f64::midpoint(low, high);
        let eps = epsilon_after(mid, sample_rate, steps, delta);
        if eps < target_epsilon {
            high = mid;
            eps_high = eps;
        } else {
            low = mid;
        }
        if high - low < 1e-6 {
            break;
        }
    }
    Ok(high)
}
