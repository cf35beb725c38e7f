//! lora-dp: differentially private LoRA fine-tuning of causal language models
//!
//! A run composes a YAML configuration, loads and optionally splits a local
//! dataset, builds the tokenizer / collator / prompt formatter triple, loads a
//! reference causal LM with 4-bit frozen projections, injects LoRA adapters,
//! wraps the optimizer and training loader with a DP-SGD privacy engine and
//! trains, saving the adapter under `<run dir>/last`.
//!
//! ```no_run
//! use lora_dp::config::load_config;
//! use lora_dp::pipeline;
//! use lora_dp::run_dir::RunDir;
//!
//! let overrides = vec!["train.evaluate_split=true".to_string()];
//! let config = load_config("conf".as_ref(), "config", &overrides)?;
//! let run_dir = RunDir::create(&config.run.dir, chrono::Local::now())?;
//! let outcome = pipeline::run(&config, &run_dir, &overrides)?;
//! println!("saved to {}", outcome.checkpoint.display());
//! # Ok::<(), lora_dp::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod lora;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod privacy;
pub mod quant;
pub mod run_dir;
pub mod tokenizer;
pub mod tracking;
pub mod train;

pub use error::{Error, Result};
