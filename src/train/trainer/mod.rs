//! Supervised fine-tuning trainer

mod core;
mod eval;
mod save;
mod train_loop;

pub use self::core::{build_optimizer, SftTrainer};
pub use save::TRAINING_ARGS_FILE;
