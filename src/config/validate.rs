//! Configuration validation
//!
//! Runs after deserialization; catches values the schema accepts but a run
//! cannot use.

use super::error::ConfigError;
use super::schema::RunConfig;

/// Validate a run configuration
pub fn validate_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.dataset.name.trim().is_empty() {
        return Err(ConfigError::invalid("dataset.name", "must not be empty"));
    }
    if config.model.name.trim().is_empty() {
        return Err(ConfigError::invalid("model.name", "must not be empty"));
    }

    let targets = &config.model.lora.target_modules;
    if targets.is_empty() {
        return Err(ConfigError::invalid("model.lora.target_modules", "must not be empty"));
    }
    if let Some(blank) = targets.iter().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "model.lora.target_modules",
            format!("contains a blank entry {blank:?}"),
        ));
    }

    if config.train.seq_length == 0 {
        return Err(ConfigError::invalid("train.seq_length", "must be > 0"));
    }

    let privacy = &config.privacy;
    if !(privacy.noise_multiplier > 0.0) {
        return Err(ConfigError::invalid(
            "privacy.noise_multiplier",
            format!("{} (must be > 0)", privacy.noise_multiplier),
        ));
    }
    if !(privacy.max_grad_norm > 0.0) {
        return Err(ConfigError::invalid(
            "privacy.max_grad_norm",
            format!("{} (must be > 0)", privacy.max_grad_norm),
        ));
    }
    if !(privacy.delta > 0.0 && privacy.delta < 1.0) {
        return Err(ConfigError::invalid(
            "privacy.delta",
            format!("{} (must be in (0, 1))", privacy.delta),
        ));
    }
    if let Some(eps) = privacy.target_epsilon {
        if !(eps > 0.0) {
            return Err(ConfigError::invalid(
                "privacy.target_epsilon",
                format!("{eps} (must be > 0)"),
            ));
        }
    }

    if config.run.dir.trim().is_empty() {
        return Err(ConfigError::invalid("run.dir", "must not be empty"));
    }

    config.training_arguments.validate()?;
    Ok(())
}
