//! Privacy parameters of a run

use crate::config::PrivacySection;

/// Arguments of [`super::PrivacyEngine::make_private`]
#[derive(Debug, Clone, PartialEq)]
pub struct PrivacyParams {
    pub noise_multiplier: f64,
    pub max_grad_norm: f64,
    pub poisson_sampling: bool,
    pub delta: f64,
    /// Micro-batches per optimizer step
    pub accumulation_steps: usize,
    /// Seed of the noise and Poisson generators unless secure mode is on
    pub seed: u64,
}

impl PrivacyParams {
    pub fn from_section(section: &PrivacySection, accumulation_steps: usize, seed: u64) -> Self {
        Self {
            noise_multiplier: section.noise_multiplier,
            max_grad_norm: section.max_grad_norm,
            poisson_sampling: section.poisson_sampling,
            delta: section.delta,
            accumulation_steps: accumulation_steps.max(1),
            seed,
        }
    }
}

impl Default for PrivacyParams {
    fn default() -> Self {
        Self::from_section(&PrivacySection::default(), 1, 42)
    }
}
