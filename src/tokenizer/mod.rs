//! Tokenization, prompt formatting and batch collation
//!
//! The training pipeline needs three collaborators built from the model
//! directory and the `model.tokenizer` configuration section:
//!
//! - a [`Tokenizer`] (byte-level, or a HuggingFace `tokenizer.json`)
//! - a [`CompletionCollator`] that pads batches and masks labels
//! - a [`PromptFormatter`] that renders dataset rows into text
//!
//! # Example
//!
//! ```
//! use lora_dp::config::TokenizerSection;
//! use lora_dp::tokenizer::get_tokenizer_and_data_collator_and_prompt_formatting;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let (tokenizer, collator, formatter) =
//!     get_tokenizer_and_data_collator_and_prompt_formatting(dir.path(), &TokenizerSection::default())?;
//! let ids = tokenizer.encode("hello")?;
//! let batch = collator.collate(&[ids]);
//! assert_eq!(batch.len(), 1);
//! assert_eq!(formatter.fields(), vec!["text"]);
//! # Ok(())
//! # }
//! ```

mod byte;
mod collator;
mod error;
mod formatting;
mod hf;
mod traits;

use std::path::Path;

pub use byte::{ByteTokenizer, BYTE_TOKENIZER_FILE};
pub use collator::{Batch, CompletionCollator, IGNORE_INDEX};
pub use error::{Result, TokenizerError};
pub use formatting::{PromptFormatter, INSTRUCTION_TEMPLATE};
pub use hf::{HfTokenizer, HF_TOKENIZER_FILE};
pub use traits::{TokenId, Tokenizer};

use crate::config::{TokenizerKind, TokenizerSection};

/// Load the tokenizer for a model directory
pub fn load_tokenizer(model_dir: &Path, section: &TokenizerSection) -> Result<Box<dyn Tokenizer>> {
    let hf_file = model_dir.join(HF_TOKENIZER_FILE);
    let tokenizer: Box<dyn Tokenizer> = match section.kind {
        TokenizerKind::Byte => Box::new(ByteTokenizer::new()),
        TokenizerKind::Hf => Box::new(HfTokenizer::from_file(&hf_file)?),
        TokenizerKind::Auto if hf_file.is_file() => Box::new(HfTokenizer::from_file(&hf_file)?),
        TokenizerKind::Auto => Box::new(ByteTokenizer::new()),
    };
    tracing::info!(
        kind = tokenizer.name(),
        vocab_size = tokenizer.vocab_size(),
        dir = %model_dir.display(),
        "tokenizer loaded"
    );
    Ok(tokenizer)
}

/// Build the tokenizer, the collator and the prompt formatter for a run
pub fn get_tokenizer_and_data_collator_and_prompt_formatting(
    model_dir: &Path,
    section: &TokenizerSection,
) -> Result<(Box<dyn Tokenizer>, CompletionCollator, PromptFormatter)> {
    let tokenizer = load_tokenizer(model_dir, section)?;

    let mut collator = CompletionCollator::new(tokenizer.pad_id(), section.padding_side);
    if let Some(template) = &section.response_template {
        collator = collator.with_response_template(tokenizer.as_ref(), template)?;
    }

    let formatter = PromptFormatter::from_section(section)?;
    Ok((tokenizer, collator, formatter))
}
