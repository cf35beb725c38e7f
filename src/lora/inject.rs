//! Adapter injection into the reference model

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{LoraConfig, LoraError, LoraLinear};
use crate::model::{CausalLm, FrozenWeight, Projection};

/// Wrap every module matched by `config` with a fresh adapter
///
/// Returns the names of the adapted modules in forward order. Nothing is
/// modified when the configuration is invalid or no module matches.
pub fn inject_adapters(
    model: &mut CausalLm,
    config: &LoraConfig,
    seed: u64,
) -> Result<Vec<String>, LoraError> {
    config.validate()?;
    let available = model.linear_module_names();
    let targets: Vec<String> = available.iter().filter(|name| config.matches(name)).cloned().collect();
    if targets.is_empty() {
        return Err(LoraError::TargetModulesNotFound {
            targets: config.target_modules.clone(),
            available,
        });
    }
    if let Some(name) = targets
        .iter()
        .find(|name| model.modules().iter().any(|(n, p)| n == *name && p.is_lora()))
    {
        return Err(LoraError::AlreadyInjected(name.clone()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for name in &targets {
        let Some(slot) = model.module_mut(name) else {
            continue;
        };
        let placeholder = Projection::Frozen(FrozenWeight::Dense(Array2::zeros((0, 0))));
        *slot = match std::mem::replace(slot, placeholder) {
            Projection::Frozen(base) => Projection::Lora(LoraLinear::new(
                base,
                config.r,
                config.lora_alpha,
                config.lora_dropout,
                &mut rng,
            )?),
            adapted => adapted,
        };
        tracing::debug!(module = %name, rank = config.r, "adapter attached");
    }

    tracing::info!(
        modules = targets.len(),
        trainable = model.num_trainable_parameters(),
        total = model.num_parameters(),
        "LoRA adapters injected"
    );
    Ok(targets)
}
