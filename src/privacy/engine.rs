//! Privacy engine: turns a model, optimizer and data loader private

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::config::PrivacyParams;
use super::error::{DpError, Result};
use super::optimizer::{DpOptimizer, DpOptimizerConfig};
use super::sampler::{BatchSampler, DpDataLoader};
use crate::model::CausalLm;
use crate::optim::GradientOptimizer;

/// Attaches per-sample clipping, noise and accounting to a training setup
#[derive(Debug, Clone, Default)]
pub struct PrivacyEngine {
    /// Draw noise from OS entropy instead of the seed
    secure_mode: bool,
}

impl PrivacyEngine {
    pub fn new(secure_mode: bool) -> Self {
        Self { secure_mode }
    }

    pub fn secure_mode(&self) -> bool {
        self.secure_mode
    }

    fn rng(&self, seed: u64) -> StdRng {
        if self.secure_mode {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(seed)
        }
    }

    /// Check that the model can be trained privately
    ///
    /// Every trainable parameter sits in a LoRA module, whose per-sample
    /// gradients the model computes; the model must be in training mode.
    pub fn validate(model: &CausalLm) -> Result<()> {
        if model.num_trainable_parameters() == 0 {
            return Err(DpError::InvalidModel("the model has no trainable parameters".to_string()));
        }
        if !model.is_training() {
            return Err(DpError::InvalidModel("the model is not in training mode".to_string()));
        }
        Ok(())
    }

    /// Wrap the optimizer and data loader for private training of `model`
    pub fn make_private(
        &self,
        model: &mut CausalLm,
        optimizer: Box<dyn GradientOptimizer>,
        data_loader: Box<dyn BatchSampler>,
        params: &PrivacyParams,
    ) -> Result<(DpOptimizer, DpDataLoader)> {
        if params.noise_multiplier < 0.0 || !params.noise_multiplier.is_finite() {
            return Err(DpError::InvalidConfig(format!(
                "noise_multiplier must be non-negative, got {}",
                params.noise_multiplier
            )));
        }
        if params.max_grad_norm <= 0.0 {
            return Err(DpError::InvalidConfig(format!(
                "max_grad_norm must be positive, got {}",
                params.max_grad_norm
            )));
        }
        if params.delta <= 0.0 || params.delta >= 1.0 {
            return Err(DpError::InvalidConfig(format!("delta must be in (0, 1), got {}", params.delta)));
        }
        if data_loader.num_samples() == 0 {
            return Err(DpError::InvalidConfig("the training data loader is empty".to_string()));
        }
        Self::validate(model)?;

        let accumulation_steps = params.accumulation_steps.max(1);
        let data_loader = DpDataLoader::from_data_loader(
            data_loader,
            params.poisson_sampling,
            accumulation_steps,
            self.rng(params.seed ^ 0x5eed),
        );
        let config = DpOptimizerConfig {
            noise_multiplier: params.noise_multiplier,
            max_grad_norm: params.max_grad_norm,
            expected_batch_size: data_loader.expected_batch_size(),
            accumulation_steps,
            sample_rate: data_loader.sample_rate(),
            delta: params.delta,
        };
        let optimizer = DpOptimizer::new(optimizer.into_inner(), config, self.rng(params.seed));

        tracing::info!(
            noise_multiplier = config.noise_multiplier,
            max_grad_norm = config.max_grad_norm,
            sample_rate = config.sample_rate,
            poisson_sampling = data_loader.is_poisson(),
            expected_batch_size = config.expected_batch_size,
            secure_mode = self.secure_mode,
            "privacy engine attached"
        );
        Ok((optimizer, data_loader))
    }
}
