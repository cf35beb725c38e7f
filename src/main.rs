//! lora-dp CLI
//!
//! # Usage
//!
//! ```bash
//! # Fine-tune with the composed conf/config.yaml
//! lora-dp train
//!
//! # Hold out an eval split and cap the run
//! lora-dp train train.evaluate_split=true +training_arguments.max_steps=50
//!
//! # Print or check the composed configuration
//! lora-dp show privacy.target_epsilon=8
//! lora-dp validate --config-path conf --config-name config
//!
//! # Write a small random reference model with a byte tokenizer
//! lora-dp init-model --out models/tiny-lm --with-tokenizer
//! ```
//!
//! Log verbosity follows `-v` / `-q` unless `LORA_DP_LOG` is set.

use clap::Parser;
use lora_dp::cli::{init_tracing, run_command, Cli, LogLevel};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(LogLevel::from_flags(cli.verbose, cli.quiet));

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
