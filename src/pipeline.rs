//! One fine-tuning run, from composed configuration to saved adapter
//!
//! The sequence is linear: each stage hands its result to the next and any
//! failure aborts the run with the stage's error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::RunConfig;
use crate::data::{load_dataset, split_for_run};
use crate::error::Result;
use crate::lora::build_lora_config;
use crate::model::{resolve_model_dir, CausalLm, LoadOptions};
use crate::privacy::{get_noise_multiplier, BatchSampler, PrivacyEngine, PrivacyParams};
use crate::quant::build_quantization_config;
use crate::run_dir::RunDir;
use crate::tokenizer::get_tokenizer_and_data_collator_and_prompt_formatting;
use crate::tracking::set_project_env;
use crate::train::{EvalMetrics, SftTrainer, TrainingArguments};

/// Epsilon tolerance of noise calibration
const CALIBRATION_TOLERANCE: f64 = 0.01;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutcome {
    pub global_step: u64,
    pub train_loss: f64,
    /// Final evaluation, when the run holds out an eval split
    pub eval: Option<EvalMetrics>,
    pub epsilon: Option<f64>,
    pub delta: f64,
    /// Noise multiplier actually used, after any calibration
    pub noise_multiplier: f64,
    /// Always `<run dir>/last`
    pub checkpoint: PathBuf,
}

/// Training arguments of a run: the configured ones, writing into the run
/// directory, with `use_cpu` off
pub fn build_training_arguments(config: &RunConfig, run_dir: &RunDir) -> TrainingArguments {
    TrainingArguments {
        output_dir: run_dir.path().to_path_buf(),
        use_cpu: false,
        ..config.training_arguments.clone()
    }
}

/// Privacy parameters of a run, calibrating the noise multiplier when a
/// target epsilon is configured
pub fn build_privacy_params(
    config: &RunConfig,
    args: &TrainingArguments,
    loader: &dyn BatchSampler,
) -> Result<PrivacyParams> {
    let mut params =
        PrivacyParams::from_section(&config.privacy, args.gradient_accumulation_steps, args.seed);
    if let Some(target) = config.privacy.target_epsilon {
        let accumulation = args.gradient_accumulation_steps.max(1) as f64;
        let n = loader.num_samples().max(1) as f64;
        let sample_rate = (loader.expected_batch_size() as f64 * accumulation / n).min(1.0);
        let (steps, _) = args.schedule(loader.num_batches());
        params.noise_multiplier =
            get_noise_multiplier(target, params.delta, sample_rate, steps, CALIBRATION_TOLERANCE)?;
        tracing::info!(
            target_epsilon = target,
            sample_rate,
            steps,
            noise_multiplier = params.noise_multiplier,
            "noise multiplier calibrated"
        );
    }
    Ok(params)
}

/// Run differentially private LoRA fine-tuning and save the adapter at `last`
pub fn run(config: &RunConfig, run_dir: &RunDir, overrides: &[String]) -> Result<TrainOutcome> {
    run_dir.save_config(config, overrides)?;
    set_project_env(&config.tracking.project);
    let engine = PrivacyEngine::new(config.privacy.secure_rng);

    let dataset =
        load_dataset(&config.dataset.name, &config.dataset.split, config.dataset.root.as_deref())?;
    let split = split_for_run(dataset, config.train.evaluate_split)?;

    let model_dir = resolve_model_dir(&config.model.name, config.model.root.as_deref())?;
    let (tokenizer, collator, formatter) =
        get_tokenizer_and_data_collator_and_prompt_formatting(&model_dir, &config.model.tokenizer)?;
    let lora_config = build_lora_config(config);
    let quantization = build_quantization_config(config);
    let args = build_training_arguments(config, run_dir);

    let mut model = CausalLm::from_pretrained(
        &config.model.name,
        config.model.root.as_deref(),
        &LoadOptions::for_training(quantization),
    )?;
    model.train();

    let mut trainer = SftTrainer::new(
        model,
        tokenizer,
        split.train,
        split.eval,
        config.train.seq_length,
        formatter,
        collator,
        lora_config,
        args,
    )?
    .with_add_eos(config.model.tokenizer.add_eos)?
    .with_base_model(config.model.name.clone());

    let optimizer = trainer.take_optimizer()?;
    let loader = trainer.take_train_dataloader()?;
    let params = build_privacy_params(config, trainer.args(), loader.as_ref())?;
    let (dp_optimizer, dp_loader) =
        engine.make_private(trainer.model_mut(), optimizer, loader, &params)?;
    trainer.set_optimizer(Box::new(dp_optimizer));
    trainer.set_train_dataloader(Box::new(dp_loader));

    let output = trainer.train()?;
    let eval = match trainer.num_eval_examples() {
        0 => None,
        _ => Some(trainer.evaluate()?),
    };

    let checkpoint = run_dir.checkpoint_path();
    trainer.save_model(&checkpoint)?;
    trainer.save_state(&checkpoint)?;
    tracing::info!(checkpoint = %checkpoint.display(), "adapter saved");

    Ok(TrainOutcome {
        global_step: output.global_step,
        train_loss: output.training_loss,
        eval,
        epsilon: output.epsilon,
        delta: params.delta,
        noise_multiplier: params.noise_multiplier,
        checkpoint,
    })
}
