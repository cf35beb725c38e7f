//! Train command

use crate::cli::logging::{log, LogLevel};
use crate::config::{load_config, to_yaml, RunArgs};
use crate::error::Result;
use crate::pipeline::{self, TrainOutcome};
use crate::run_dir::RunDir;

pub fn run_train(args: RunArgs, level: LogLevel) -> Result<()> {
    let config = load_config(&args.config_path, &args.config_name, &args.overrides)?;
    log(level, LogLevel::Normal, &to_yaml(&config)?);

    let run_dir = RunDir::create(&config.run.dir, chrono::Local::now())?;
    log(level, LogLevel::Normal, &format!("Output directory: {}", run_dir.path().display()));

    let outcome = pipeline::run(&config, &run_dir, &args.overrides)?;
    log(level, LogLevel::Normal, &format_outcome(&outcome));
    Ok(())
}

/// Human-readable end-of-run report
pub fn format_outcome(outcome: &TrainOutcome) -> String {
    let mut lines = vec![
        "Training complete".to_string(),
        format!("  steps:            {}", outcome.global_step),
        format!("  train loss:       {:.4}", outcome.train_loss),
    ];
    if let Some(eval) = &outcome.eval {
        lines.push(format!("  eval loss:        {:.4}", eval.eval_loss));
        lines.push(format!("  eval perplexity:  {:.2}", eval.perplexity));
    }
    lines.push(format!("  noise multiplier: {:.4}", outcome.noise_multiplier));
    match outcome.epsilon {
        Some(eps) => lines.push(format!("  privacy:          ε = {eps:.4} at δ = {:e}", outcome.delta)),
        None => lines.push("  privacy:          not tracked".to_string()),
    }
    lines.push(format!("  adapter:          {}", outcome.checkpoint.display()));
    lines.join("\n")
}
