//! Saving adapters, tokenizer and arguments

use std::fs;
use std::path::{Path, PathBuf};

use super::core::SftTrainer;
use crate::error::{Error, Result};
use crate::lora::PeftAdapterBundle;
use crate::train::{checkpoint_dir, rotate_checkpoints};

/// Training arguments saved next to every adapter
pub const TRAINING_ARGS_FILE: &str = "training_args.json";

impl SftTrainer {
    /// Write the PEFT adapter, the tokenizer files and `training_args.json`
    pub fn save_model(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let mut bundle = PeftAdapterBundle::from_model(&self.model, &self.lora_config);
        if let Some(name) = &self.base_model {
            bundle = bundle.with_base_model(name.clone());
        }
        bundle.save_peft(dir)?;
        self.tokenizer.save(dir)?;

        let args_path = dir.join(TRAINING_ARGS_FILE);
        fs::write(&args_path, self.args.to_json()?).map_err(|e| Error::io(&args_path, e))?;

        tracing::info!(dir = %dir.display(), adapters = bundle.len(), "model saved");
        Ok(())
    }

    /// Write `trainer_state.json` into `dir`
    pub fn save_state(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.state.save(dir.as_ref())
    }

    /// Save `checkpoint-<step>` and apply `save_total_limit`
    pub(crate) fn save_checkpoint(&mut self) -> Result<PathBuf> {
        let dir = checkpoint_dir(&self.args.output_dir, self.state.global_step);
        self.save_model(&dir)?;
        if self.best_step == Some(self.state.global_step) {
            self.state.best_model_checkpoint = Some(dir.display().to_string());
        }
        self.save_state(&dir)?;

        if let Some(limit) = self.args.save_total_limit {
            let best = self.state.best_model_checkpoint.as_deref().map(Path::new);
            rotate_checkpoints(&self.args.output_dir, limit, best)?;
        }
        Ok(dir)
    }
}
