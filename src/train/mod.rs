//! Supervised fine-tuning
//!
//! [`SftTrainer`] drives LoRA training of a [`crate::model::CausalLm`] over
//! formatted, tokenized text:
//! - per-example gradients aggregated by a [`crate::optim::GradientOptimizer`]
//! - gradient accumulation and learning-rate schedules
//! - step/epoch evaluation and checkpointing with rotation
//! - `trainer_state.json` and metrics logging

mod args;
mod checkpoint;
mod result;
mod state;
mod trainer;


pub use args::{IntervalStrategy, TrainingArguments};
pub use checkpoint::{checkpoint_dir, rotate_checkpoints, sorted_checkpoints, CHECKPOINT_PREFIX};
pub use result::{perplexity, EvalMetrics, TrainOutput};
pub use state::{TrainerState, TRAINER_STATE_FILE};
pub use trainer::{build_optimizer, SftTrainer, TRAINING_ARGS_FILE};
