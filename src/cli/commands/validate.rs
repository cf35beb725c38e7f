//! Validate command

use crate::cli::logging::{log, LogLevel};
use crate::config::{config_file, load_config, RunArgs, RunConfig};
use crate::error::Result;
use crate::lora::build_lora_config;
use crate::quant::build_quantization_config;

pub fn run_validate(args: RunArgs, level: LogLevel) -> Result<()> {
    let path = config_file(&args.config_path, &args.config_name);
    log(level, LogLevel::Verbose, &format!("Validating: {}", path.display()));

    let config = load_config(&args.config_path, &args.config_name, &args.overrides)?;
    log(level, LogLevel::Normal, "Configuration is valid");
    log(level, LogLevel::Normal, &format_summary(&config));
    Ok(())
}

/// What a run with `config` would do, one setting per line
pub fn format_summary(config: &RunConfig) -> String {
    let lora = build_lora_config(config);
    let quant = build_quantization_config(config);
    let args = &config.training_arguments;
    let privacy = &config.privacy;

    let mut lines = vec![
        format!("  dataset:  {} (split: {})", config.dataset.name, config.dataset.split),
        format!(
            "  eval:     {}",
            if config.train.evaluate_split { "held-out split" } else { "none" }
        ),
        format!("  model:    {}", config.model.name),
        format!(
            "  lora:     r={} alpha={} dropout={} targets=[{}]",
            lora.r,
            lora.lora_alpha,
            lora.lora_dropout,
            lora.target_modules.join(", ")
        ),
        format!(
            "  quant:    {}-bit {:?} (compute {:?})",
            quant.bits(),
            quant.quant_type,
            quant.compute_dtype
        ),
        format!("  seq len:  {}", config.train.seq_length),
        format!(
            "  batch:    {} x {} accumulation, lr {}",
            args.per_device_train_batch_size, args.gradient_accumulation_steps, args.learning_rate
        ),
    ];
    match privacy.target_epsilon {
        Some(target) => lines.push(format!(
            "  privacy:  target ε={target} δ={:e} C={}",
            privacy.delta, privacy.max_grad_norm
        )),
        None => lines.push(format!(
            "  privacy:  σ={} δ={:e} C={}",
            privacy.noise_multiplier, privacy.delta, privacy.max_grad_norm
        )),
    }
    lines.push(format!(
        "  sampling: {}",
        if privacy.poisson_sampling { "poisson" } else { "shuffle" }
    ));
    lines.push(format!("  run dir:  {}", config.run.dir));
    lines.join("\n")
}
