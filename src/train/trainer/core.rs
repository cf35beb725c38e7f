//! Supervised fine-tuning trainer: construction and accessors

use std::fs;

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::lora::{inject_adapters, LoraConfig};
use crate::model::CausalLm;
use crate::optim::{AdamW, GradientOptimizer, Optimizer, OptimizerKind, Sgd, StandardOptimizer};
use crate::privacy::{BatchSampler, ShuffleSampler};
use crate::tokenizer::{CompletionCollator, PromptFormatter, TokenId, Tokenizer};
use crate::tracking::{LogEvent, Tracker, PROJECT_ENV};
use crate::train::{IntervalStrategy, TrainerState, TrainingArguments};

/// Project name used when `WANDB_PROJECT` is unset
const DEFAULT_PROJECT: &str = "huggingface";

/// Fine-tunes LoRA adapters of a causal LM on formatted text
///
/// Construction injects the adapters, formats and tokenizes both datasets,
/// and builds the default optimizer and training loader. Both can be swapped
/// before [`SftTrainer::train`], which is how the privacy engine takes over.
///
/// # Example
///
/// ```no_run
/// use lora_dp::data::Dataset;
/// use lora_dp::lora::LoraConfig;
/// use lora_dp::model::{CausalLm, ModelConfig};
/// use lora_dp::config::PaddingSide;
/// use lora_dp::tokenizer::{ByteTokenizer, CompletionCollator, PromptFormatter, Tokenizer};
/// use lora_dp::train::{SftTrainer, TrainingArguments};
///
/// # fn main() -> lora_dp::Result<()> {
/// let model = CausalLm::random(ModelConfig::new(259, 16, 1, vec!["q_proj".into()]), 0)?;
/// let tokenizer = ByteTokenizer::new();
/// let collator = CompletionCollator::new(tokenizer.pad_id(), PaddingSide::Right);
/// let rows = vec![serde_json::json!({ "text": "hello world" })];
/// let train = Dataset::from_values("toy", rows)?;
/// let mut trainer = SftTrainer::new(
///     model,
///     Box::new(tokenizer),
///     train,
///     None,
///     64,
///     PromptFormatter::text_field("text"),
///     collator,
///     LoraConfig::new(4, 8.0, vec!["q_proj".into()]),
///     TrainingArguments { max_steps: 2, ..TrainingArguments::new("out") },
/// )?;
/// let output = trainer.train()?;
/// trainer.save_model("out/last")?;
/// println!("loss {:.3}", output.training_loss);
/// # Ok(())
/// # }
/// ```
pub struct SftTrainer {
    pub(crate) model: CausalLm,
    pub(crate) tokenizer: Box<dyn Tokenizer>,
    pub(crate) collator: CompletionCollator,
    pub(crate) formatter: PromptFormatter,
    pub(crate) lora_config: LoraConfig,
    pub(crate) args: TrainingArguments,
    pub(crate) max_seq_length: usize,
    pub(crate) add_eos: bool,
    pub(crate) train_dataset: Dataset,
    pub(crate) eval_dataset: Option<Dataset>,
    pub(crate) train_examples: Vec<Vec<TokenId>>,
    pub(crate) eval_examples: Vec<Vec<TokenId>>,
    pub(crate) optimizer: Option<Box<dyn GradientOptimizer>>,
    pub(crate) train_loader: Option<Box<dyn BatchSampler>>,
    pub(crate) tracker: Tracker,
    pub(crate) state: TrainerState,
    /// Step of the last evaluation that improved on the best loss
    pub(crate) best_step: Option<u64>,
    pub(crate) base_model: Option<String>,
}

impl SftTrainer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut model: CausalLm,
        tokenizer: Box<dyn Tokenizer>,
        train_dataset: Dataset,
        eval_dataset: Option<Dataset>,
        max_seq_length: usize,
        formatter: PromptFormatter,
        collator: CompletionCollator,
        lora_config: LoraConfig,
        args: TrainingArguments,
    ) -> Result<Self> {
        args.validate()?;
        if max_seq_length == 0 {
            return Err(Error::training("max_seq_length must be > 0"));
        }
        if args.eval_strategy != IntervalStrategy::No && eval_dataset.is_none() {
            return Err(Error::training(format!(
                "eval_strategy={:?} requires an eval dataset",
                args.eval_strategy
            )));
        }
        fs::create_dir_all(&args.output_dir).map_err(|e| Error::io(&args.output_dir, e))?;

        inject_adapters(&mut model, &lora_config, args.seed)?;
        model.seed_dropout(args.seed);
        model.train();

        let project = std::env::var(PROJECT_ENV).unwrap_or_else(|_| DEFAULT_PROJECT.to_string());
        let tracker = Tracker::from_report_to(&project, &args.report_to, &args.output_dir)?;

        let mut trainer = Self {
            model,
            tokenizer,
            collator,
            formatter,
            lora_config,
            optimizer: Some(build_optimizer(&args)),
            train_loader: None,
            args,
            max_seq_length,
            add_eos: true,
            train_dataset,
            eval_dataset,
            train_examples: Vec::new(),
            eval_examples: Vec::new(),
            tracker,
            state: TrainerState::default(),
            best_step: None,
            base_model: None,
        };
        trainer.tokenize()?;
        Ok(trainer)
    }

    /// Append (or not) the end-of-sequence token, re-tokenizing both datasets
    pub fn with_add_eos(mut self, add_eos: bool) -> Result<Self> {
        if add_eos != self.add_eos {
            self.add_eos = add_eos;
            self.tokenize()?;
        }
        Ok(self)
    }

    /// Name recorded as `base_model_name_or_path` in saved adapters
    #[must_use]
    pub fn with_base_model(mut self, name: impl Into<String>) -> Self {
        self.base_model = Some(name.into());
        self
    }

    /// Replace the tracker built from `report_to`
    #[must_use]
    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    fn tokenize(&mut self) -> Result<()> {
        self.train_examples = self.tokenize_dataset(&self.train_dataset)?;
        if self.train_examples.is_empty() {
            return Err(Error::training("the training dataset is empty"));
        }
        self.eval_examples = match &self.eval_dataset {
            Some(eval) => self.tokenize_dataset(eval)?,
            None => Vec::new(),
        };
        self.train_loader = Some(Box::new(ShuffleSampler::new(
            self.train_examples.len(),
            self.args.per_device_train_batch_size,
            self.args.dataloader_drop_last,
            self.args.seed,
        )));
        Ok(())
    }

    fn tokenize_dataset(&self, dataset: &Dataset) -> Result<Vec<Vec<TokenId>>> {
        let mut examples = Vec::with_capacity(dataset.len());
        let mut truncated = 0usize;
        for (index, row) in dataset.iter().enumerate() {
            let text = self.formatter.format(row, index)?;
            let mut ids = self.tokenizer.encode_with_special(&text, self.add_eos)?;
            if ids.len() > self.max_seq_length {
                ids.truncate(self.max_seq_length);
                truncated += 1;
            }
            examples.push(ids);
        }
        tracing::info!(
            dataset = dataset.name(),
            examples = examples.len(),
            truncated,
            max_seq_length = self.max_seq_length,
            "dataset tokenized"
        );
        Ok(examples)
    }

    /// Hand the optimizer out, e.g. to wrap it privately
    pub fn take_optimizer(&mut self) -> Result<Box<dyn GradientOptimizer>> {
        self.optimizer.take().ok_or_else(|| Error::training("the optimizer was already taken"))
    }

    pub fn set_optimizer(&mut self, optimizer: Box<dyn GradientOptimizer>) {
        self.optimizer = Some(optimizer);
    }

    /// Hand the training loader out, e.g. to wrap it privately
    pub fn take_train_dataloader(&mut self) -> Result<Box<dyn BatchSampler>> {
        self.train_loader.take().ok_or_else(|| Error::training("the training data loader was already taken"))
    }

    pub fn set_train_dataloader(&mut self, loader: Box<dyn BatchSampler>) {
        self.train_loader = Some(loader);
    }

    pub fn model(&self) -> &CausalLm {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut CausalLm {
        &mut self.model
    }

    pub fn into_model(self) -> CausalLm {
        self.model
    }

    pub fn args(&self) -> &TrainingArguments {
        &self.args
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn lora_config(&self) -> &LoraConfig {
        &self.lora_config
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Tokenized training examples
    pub fn train_examples(&self) -> &[Vec<TokenId>] {
        &self.train_examples
    }

    pub fn num_eval_examples(&self) -> usize {
        self.eval_examples.len()
    }

    /// Record an event in the state history and every sink
    pub(crate) fn log(&mut self, event: LogEvent) -> Result<()> {
        self.state.log_history.push(event.clone());
        self.tracker.log(event)?;
        Ok(())
    }
}

/// Optimizer named by `optim`, averaging per-example gradients
pub fn build_optimizer(args: &TrainingArguments) -> Box<dyn GradientOptimizer> {
    let lr = args.learning_rate as f32;
    let inner: Box<dyn Optimizer> = match args.optim {
        OptimizerKind::AdamW => Box::new(AdamW::new(
            lr,
            args.adam_beta1 as f32,
            args.adam_beta2 as f32,
            args.adam_epsilon as f32,
            args.weight_decay as f32,
        )),
        OptimizerKind::Sgd => Box::new(Sgd::new(lr, 0.0)),
    };
    Box::new(StandardOptimizer::new(inner, args.max_grad_norm as f32))
}
