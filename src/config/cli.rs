//! Command-line interface types

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// lora-dp: differentially private LoRA fine-tuning
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lora-dp")]
#[command(version)]
#[command(about = "Differentially private LoRA fine-tuning of 4-bit quantized causal language models")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Compose the configuration and run DP fine-tuning
    Train(RunArgs),

    /// Print the composed configuration
    Show(RunArgs),

    /// Compose and validate the configuration without training
    Validate(RunArgs),

    /// Write a randomly initialized reference model
    InitModel(InitModelArgs),
}

/// Configuration source shared by train, show and validate
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Directory holding the configuration files
    #[arg(long, default_value = "conf")]
    pub config_path: PathBuf,

    /// Configuration file name, with or without `.yaml`
    #[arg(long, default_value = "config")]
    pub config_name: String,

    /// Overrides: key=value, +key=value, ++key=value, ~key
    #[arg(value_name = "OVERRIDE", allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

/// Arguments for the init-model command
#[derive(Args, Debug, Clone, PartialEq)]
pub struct InitModelArgs {
    /// Output directory
    #[arg(short, long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = 259)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 32)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 2)]
    pub layers: usize,

    /// Projection module names inside each block
    #[arg(long, value_delimiter = ',', default_value = "q_proj,v_proj")]
    pub modules: Vec<String>,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Also write a byte-level tokenizer description
    #[arg(long)]
    pub with_tokenizer: bool,
}

/// Parse CLI arguments from an iterator
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults() {
        let cli = parse_args(["lora-dp", "train"]).unwrap();
        let Command::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.config_path, PathBuf::from("conf"));
        assert_eq!(args.config_name, "config");
        assert!(args.overrides.is_empty());
    }

    #[test]
    fn test_train_overrides() {
        let cli = parse_args([
            "lora-dp",
            "train",
            "--config-path",
            "cfg",
            "train.evaluate_split=true",
            "+training_arguments.max_steps=3",
            "~tracking",
        ])
        .unwrap();
        let Command::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(args.config_path, PathBuf::from("cfg"));
        assert_eq!(
            args.overrides,
            vec!["train.evaluate_split=true", "+training_arguments.max_steps=3", "~tracking"]
        );
    }

    #[test]
    fn test_global_flags() {
        let cli = parse_args(["lora-dp", "-v", "show"]).unwrap();
        assert!(cli.verbose);
        assert!(parse_args(["lora-dp", "-v", "-q", "show"]).is_err());
    }

    #[test]
    fn test_init_model_modules() {
        let cli =
            parse_args(["lora-dp", "init-model", "--out", "m", "--modules", "q_proj,k_proj,v_proj"])
                .unwrap();
        let Command::InitModel(args) = cli.command else { panic!("expected init-model") };
        assert_eq!(args.modules, vec!["q_proj", "k_proj", "v_proj"]);
        assert_eq!(args.vocab_size, 259);
    }
}
