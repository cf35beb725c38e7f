//! Command-line front end
//!
//! Parsing lives in [`crate::config::Cli`]; this module runs the parsed
//! command and sets up logging.

mod commands;
mod logging;

pub use commands::{format_outcome, format_summary, run_command};
pub use logging::{init_tracing, log, LogLevel, LOG_ENV};

pub use crate::config::Cli;
