//! Gradient operations for differential privacy.

use ndarray::Array1;
use rand::Rng;
use std::f64::consts::PI;

/// Clip a per-sample gradient to `max_norm` in place
///
/// Uses the factor `min(1, C / (‖g‖ + 1e-6))` and returns whether the
/// gradient was scaled down.
pub fn clip_gradient(grad: &mut Array1<f32>, max_norm: f32) -> bool {
    let norm = crate::optim::grad_norm(grad);
    let factor = (max_norm / (norm + 1e-6)).min(1.0);
    if factor < 1.0 {
        *grad *= factor;
        true
    } else {
        false
    }
}

/// One standard normal sample (Box-Muller transform)
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Add N(0, std_dev²) noise to every coordinate
pub fn add_gaussian_noise<R: Rng + ?Sized>(grad: &mut Array1<f32>, std_dev: f64, rng: &mut R) {
    if std_dev <= 0.0 {
        return;
    }
    grad.mapv_inplace(|x| x + (standard_normal(rng) * std_dev) as f32);
}
