//! Training arguments with HuggingFace-compatible names and defaults
//!
//! The `training_arguments` section of a run configuration deserializes
//! straight into [`TrainingArguments`]; unknown keys are rejected.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::optim::{OptimizerKind, SchedulerType};

/// When evaluation or checkpointing happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStrategy {
    #[default]
    No,
    Steps,
    Epoch,
}

/// Accept `report_to: all` as well as `report_to: [jsonl, wandb]`
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Arguments of the fine-tuning loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingArguments {
    /// Where checkpoints and logs go; the pipeline sets it to the run directory
    pub output_dir: PathBuf,
    pub num_train_epochs: f64,
    /// Positive values override `num_train_epochs`
    pub max_steps: i64,
    pub per_device_train_batch_size: usize,
    pub per_device_eval_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub adam_beta1: f64,
    pub adam_beta2: f64,
    pub adam_epsilon: f64,
    /// Global gradient clipping of non-private runs; `0` disables it
    pub max_grad_norm: f64,
    pub optim: OptimizerKind,
    pub lr_scheduler_type: SchedulerType,
    pub warmup_ratio: f64,
    /// Wins over `warmup_ratio` when positive
    pub warmup_steps: usize,
    pub logging_steps: usize,
    pub logging_first_step: bool,
    #[serde(alias = "evaluation_strategy")]
    pub eval_strategy: IntervalStrategy,
    /// Defaults to `logging_steps`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_steps: Option<usize>,
    pub save_strategy: IntervalStrategy,
    pub save_steps: usize,
    /// Keep at most this many `checkpoint-<step>` directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_total_limit: Option<usize>,
    pub seed: u64,
    #[serde(deserialize_with = "string_or_list")]
    pub report_to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    pub use_cpu: bool,
    pub bf16: bool,
    pub fp16: bool,
    pub gradient_checkpointing: bool,
    pub remove_unused_columns: bool,
    pub dataloader_drop_last: bool,
    pub disable_tqdm: bool,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("trainer_output"),
            num_train_epochs: 3.0,
            max_steps: -1,
            per_device_train_batch_size: 8,
            per_device_eval_batch_size: 8,
            gradient_accumulation_steps: 1,
            learning_rate: 5e-5,
            weight_decay: 0.0,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_epsilon: 1e-8,
            max_grad_norm: 1.0,
            optim: OptimizerKind::default(),
            lr_scheduler_type: SchedulerType::default(),
            warmup_ratio: 0.0,
            warmup_steps: 0,
            logging_steps: 500,
            logging_first_step: false,
            eval_strategy: IntervalStrategy::No,
            eval_steps: None,
            save_strategy: IntervalStrategy::Steps,
            save_steps: 500,
            save_total_limit: None,
            seed: 42,
            report_to: vec!["all".to_string()],
            run_name: None,
            use_cpu: false,
            bf16: false,
            fp16: false,
            gradient_checkpointing: false,
            remove_unused_columns: true,
            dataloader_drop_last: false,
            disable_tqdm: false,
        }
    }
}

impl TrainingArguments {
    /// Arguments writing to `output_dir`, everything else default
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into(), ..Self::default() }
    }

    /// Step limit when `max_steps` is set
    #[must_use]
    pub fn max_steps(&self) -> Option<usize> {
        usize::try_from(self.max_steps).ok().filter(|&s| s > 0)
    }

    /// Steps between evaluations under the `steps` strategy
    #[must_use]
    pub fn eval_interval(&self) -> usize {
        self.eval_steps.unwrap_or(self.logging_steps).max(1)
    }

    /// `(optimizer steps, epochs)` for a loader with `batches_per_epoch` batches
    ///
    /// An epoch ends with a step even when its last accumulation window is
    /// short; `max_steps` wins over `num_train_epochs`.
    #[must_use]
    pub fn schedule(&self, batches_per_epoch: usize) -> (usize, usize) {
        let steps_per_epoch = batches_per_epoch.div_ceil(self.gradient_accumulation_steps.max(1)).max(1);
        match self.max_steps() {
            Some(max) => (max, max.div_ceil(steps_per_epoch)),
            None => {
                let total = (self.num_train_epochs * steps_per_epoch as f64).ceil() as usize;
                (total.max(1), self.num_train_epochs.ceil() as usize)
            }
        }
    }

    /// Check values the schema accepts but the loop cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        let field = |name: &'static str, message: String| Err(ConfigError::invalid(name, message));

        if self.per_device_train_batch_size == 0 {
            return field("training_arguments.per_device_train_batch_size", "must be > 0".into());
        }
        if self.per_device_eval_batch_size == 0 {
            return field("training_arguments.per_device_eval_batch_size", "must be > 0".into());
        }
        if self.gradient_accumulation_steps == 0 {
            return field("training_arguments.gradient_accumulation_steps", "must be > 0".into());
        }
        if !(self.learning_rate >= 0.0 && self.learning_rate.is_finite()) {
            return field("training_arguments.learning_rate", format!("{} (must be >= 0)", self.learning_rate));
        }
        if self.max_steps().is_none() && !(self.num_train_epochs > 0.0) {
            return field(
                "training_arguments.num_train_epochs",
                format!("{} (must be > 0 when max_steps is not set)", self.num_train_epochs),
            );
        }
        if !(0.0..=1.0).contains(&self.warmup_ratio) {
            return field("training_arguments.warmup_ratio", format!("{} (must be in [0, 1])", self.warmup_ratio));
        }
        if self.max_grad_norm < 0.0 {
            return field("training_arguments.max_grad_norm", format!("{} (must be >= 0)", self.max_grad_norm));
        }
        if self.logging_steps == 0 {
            return field("training_arguments.logging_steps", "must be > 0".into());
        }
        if self.save_strategy == IntervalStrategy::Steps && self.save_steps == 0 {
            return field("training_arguments.save_steps", "must be > 0 with save_strategy=steps".into());
        }
        if self.eval_steps == Some(0) {
            return field("training_arguments.eval_steps", "must be > 0".into());
        }
        if self.bf16 && self.fp16 {
            return field("training_arguments.bf16", "bf16 and fp16 are mutually exclusive".into());
        }
        Ok(())
    }

    /// Pretty JSON written as `training_args.json` next to saved adapters
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_huggingface() {
        let args = TrainingArguments::default();
        assert_eq!(args.per_device_train_batch_size, 8);
        assert_eq!(args.learning_rate, 5e-5);
        assert_eq!(args.logging_steps, 500);
        assert_eq!(args.max_steps(), None);
        assert_eq!(args.report_to, vec!["all"]);
        assert_eq!(args.eval_interval(), 500);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_aliases() {
        let args: TrainingArguments = serde_yaml::from_str(
            "evaluation_strategy: steps\neval_steps: 20\nreport_to: none\noptim: adamw_hf\nlr_scheduler_type: cosine\nmax_steps: 7\n",
        )
        .unwrap();
        assert_eq!(args.eval_strategy, IntervalStrategy::Steps);
        assert_eq!(args.eval_interval(), 20);
        assert_eq!(args.report_to, vec!["none"]);
        assert_eq!(args.optim, OptimizerKind::AdamW);
        assert_eq!(args.lr_scheduler_type, SchedulerType::Cosine);
        assert_eq!(args.max_steps(), Some(7));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = serde_yaml::from_str::<TrainingArguments>("learning_rat: 0.1").unwrap_err();
        assert!(err.to_string().contains("learning_rat"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            TrainingArguments { per_device_train_batch_size: 0, ..Default::default() },
            TrainingArguments { gradient_accumulation_steps: 0, ..Default::default() },
            TrainingArguments { num_train_epochs: 0.0, ..Default::default() },
            TrainingArguments { warmup_ratio: 1.5, ..Default::default() },
            TrainingArguments { logging_steps: 0, ..Default::default() },
            TrainingArguments { bf16: true, fp16: true, ..Default::default() },
        ];
        for args in bad {
            assert!(matches!(args.validate(), Err(ConfigError::Invalid { .. })), "{args:?}");
        }
        let steps_only = TrainingArguments { num_train_epochs: 0.0, max_steps: 10, ..Default::default() };
        assert!(steps_only.validate().is_ok());
    }

    #[test]
    fn test_schedule() {
        let epochs = TrainingArguments { num_train_epochs: 2.0, ..Default::default() };
        assert_eq!(epochs.schedule(3), (6, 2));
        let partial = TrainingArguments { num_train_epochs: 0.5, ..Default::default() };
        assert_eq!(partial.schedule(4), (2, 1));
        let accumulated = TrainingArguments { gradient_accumulation_steps: 2, num_train_epochs: 1.0, ..Default::default() };
        assert_eq!(accumulated.schedule(5), (3, 1));
        let capped = TrainingArguments { max_steps: 7, ..Default::default() };
        assert_eq!(capped.schedule(3), (7, 3));
    }

    #[test]
    fn test_json_roundtrip_keeps_values() {
        let args = TrainingArguments { save_total_limit: Some(2), ..TrainingArguments::new("out") };
        let back: TrainingArguments = serde_json::from_str(&args.to_json().unwrap()).unwrap();
        assert_eq!(back, args);
    }
}
