//! RDP (Renyi Differential Privacy) accountant.
//!
//! Tracks the RDP of the sampled Gaussian mechanism at integer orders and
//! converts it to (ε, δ). Based on Mironov (2017) and Mironov, Talwar and
//! Zhang (2019).

use serde::{Deserialize, Serialize};

/// Orders tracked by default: 2..=64, then 80, 96, 128, 256
pub fn default_orders() -> Vec<u32> {
    (2..=64).chain([80, 96, 128, 256]).collect()
}

/// RDP (Renyi Differential Privacy) accountant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdpAccountant {
    /// RDP orders to track
    orders: Vec<u32>,
    /// Accumulated RDP values for each order
    pub(crate) rdp: Vec<f64>,
    /// Number of steps taken
    steps: usize,
}

impl RdpAccountant {
    /// Create a new RDP accountant
    pub fn new() -> Self {
        Self::with_orders(default_orders())
    }

    /// Create with custom orders
    pub fn with_orders(orders: Vec<u32>) -> Self {
        let rdp = vec![0.0; orders.len()];
        Self { orders, rdp, steps: 0 }
    }

    /// Record `steps` applications of the mechanism
    pub fn step_many(&mut self, noise_multiplier: f64, sample_rate: f64, steps: usize) {
        for (i, &alpha) in self.orders.iter().enumerate() {
            self.rdp[i] += steps as f64 * compute_rdp_gaussian(noise_multiplier, sample_rate, alpha);
        }
        self.steps += steps;
    }

    /// Record a training step
    pub fn step(&mut self, noise_multiplier: f64, sample_rate: f64) {
        self.step_many(noise_multiplier, sample_rate, 1);
    }

    /// Get privacy spent as (epsilon, best order)
    pub fn get_privacy_spent(&self, delta: f64) -> (f64, f64) {
        rdp_to_dp(&self.orders, &self.rdp, delta)
    }

    /// Epsilon spent at `delta`
    pub fn get_epsilon(&self, delta: f64) -> f64 {
        self.get_privacy_spent(delta).0
    }

    /// Get number of steps
    pub fn n_steps(&self) -> usize {
        self.steps
    }

    /// Reset the accountant
    pub fn reset(&mut self) {
        self.rdp.iter_mut().for_each(|r| *r = 0.0);
        self.steps = 0;
    }
}

impl Default for RdpAccountant {
    fn default() -> Self {
        Self::new()
    }
}

fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// RDP at integer order `alpha` of one step of the sampled Gaussian mechanism
///
/// `log A_α = log Σ_i C(α, i) q^i (1-q)^(α-i) exp((i² - i) / (2σ²))`,
/// RDP = `log A_α / (α - 1)`.
pub fn compute_rdp_gaussian(noise_multiplier: f64, sample_rate: f64, alpha: u32) -> f64 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    if noise_multiplier <= 0.0 {
        return f64::INFINITY;
    }
    let sigma_sq = noise_multiplier * noise_multiplier;
    let a = f64::from(alpha);
    if sample_rate >= 1.0 {
        return a / (2.0 * sigma_sq);
    }

    let q = sample_rate;
    let (log_q, log_1mq) = (q.ln(), (-q).ln_1p());
    let mut log_a = f64::NEG_INFINITY;
    let mut log_binom = 0.0;
    for i in 0..=alpha {
        let fi = f64::from(i);
        if i > 0 {
            log_binom += (a - fi + 1.0).ln() - fi.ln();
        }
        let term = log_binom + fi * log_q + (a - fi) * log_1mq + (fi * fi - fi) / (2.0 * sigma_sq);
        log_a = log_add(log_a, term);
    }
    log_a / (a - 1.0)
}

/// Convert RDP to (epsilon, best order)
///
/// `ε = rdp - (log δ + log α) / (α - 1) + log((α - 1) / α)`, minimised over orders.
pub fn rdp_to_dp(orders: &[u32], rdp: &[f64], delta: f64) -> (f64, f64) {
    if delta <= 0.0 || orders.is_empty() {
        return (f64::INFINITY, f64::NAN);
    }
    let log_delta = delta.ln();

    let mut best = (f64::INFINITY, f64::NAN);
    for (&alpha, &rdp_alpha) in orders.iter().zip(rdp) {
        let a = f64::from(alpha);
        if a <= 1.0 {
            continue;
        }
        let epsilon = rdp_alpha - (log_delta + a.ln()) / (a - 1.0) + ((a - 1.0) / a).ln();
        if epsilon < best.0 {
            best = (epsilon, a);
        }
    }
    (best.0.max(0.0), best.1)
}
