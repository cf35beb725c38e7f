//! Init-model command

use crate::cli::logging::{log, LogLevel};
use crate::config::InitModelArgs;
use crate::error::{Error, Result};
use crate::model::{CausalLm, ModelConfig};
use crate::tokenizer::{ByteTokenizer, Tokenizer};

pub fn run_init_model(args: InitModelArgs, level: LogLevel) -> Result<()> {
    if args.with_tokenizer && args.vocab_size < ByteTokenizer::VOCAB_SIZE {
        return Err(Error::training(format!(
            "vocab_size {} is smaller than the byte tokenizer's {}",
            args.vocab_size,
            ByteTokenizer::VOCAB_SIZE
        )));
    }

    let config = ModelConfig::new(args.vocab_size, args.hidden_size, args.layers, args.modules);
    let model = CausalLm::random(config, args.seed)?;
    model.save_pretrained(&args.out)?;
    if args.with_tokenizer {
        ByteTokenizer::new().save(&args.out)?;
    }

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Wrote model with {} parameters to {}",
            model.num_parameters(),
            args.out.display()
        ),
    );
    log(level, LogLevel::Verbose, &format!("  modules: {}", model.linear_module_names().join(", ")));
    Ok(())
}
