//! Command implementations

mod init_model;
mod show;
mod train;
mod validate;

#[cfg(test)]
mod tests;

use crate::cli::LogLevel;
use crate::config::{Cli, Command};
use crate::error::Result;

pub use train::format_outcome;
pub use validate::format_summary;

/// Execute a parsed command
pub fn run_command(cli: Cli) -> Result<()> {
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);

    match cli.command {
        Command::Train(args) => train::run_train(args, log_level),
        Command::Show(args) => show::run_show(args),
        Command::Validate(args) => validate::run_validate(args, log_level),
        Command::InitModel(args) => init_model::run_init_model(args, log_level),
    }
}
