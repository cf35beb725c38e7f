//! End-to-end runs: random reference model, JSONL dataset, DP fine-tuning

use std::fs;
use std::path::Path;

use lora_dp::config::{load_config, RunConfig};
use lora_dp::lora::{PeftAdapterBundle, ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE};
use lora_dp::model::{CausalLm, ModelConfig};
use lora_dp::pipeline;
use lora_dp::run_dir::RunDir;
use lora_dp::tokenizer::{ByteTokenizer, Tokenizer};
use lora_dp::tracking::METRICS_FILE;
use lora_dp::train::{TrainerState, TRAINER_STATE_FILE};
use tempfile::TempDir;

fn write_model(dir: &Path) {
    let config = ModelConfig::new(ByteTokenizer::VOCAB_SIZE, 8, 1, vec!["q_proj".into(), "v_proj".into()]);
    let model = CausalLm::random(config, 5).unwrap();
    model.save_pretrained(dir).unwrap();
    ByteTokenizer::new().save(dir).unwrap();
}

fn write_dataset(path: &Path, rows: usize) {
    let text: String = (0..rows)
        .map(|i| format!("{{\"instruction\": \"say {i}\", \"output\": \"{i} {i}\"}}\n"))
        .collect();
    fs::write(path, text).unwrap();
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(rows: usize) -> Self {
        let dir = TempDir::new().unwrap();
        write_model(&dir.path().join("models/tiny-lm"));
        fs::create_dir_all(dir.path().join("data/toy")).unwrap();
        write_dataset(&dir.path().join("data/toy/train.jsonl"), rows);
        Self { dir }
    }

    fn config(&self) -> RunConfig {
        let mut config = RunConfig::new("toy", "tiny-lm", vec!["q_proj".into(), "v_proj".into()]);
        config.dataset.root = Some(self.dir.path().join("data"));
        config.model.root = Some(self.dir.path().join("models"));
        config.model.tokenizer.template = Some("Q: {instruction}\nA: {output}".into());
        config.model.tokenizer.response_template = Some("\nA:".into());
        config.train.seq_length = 48;
        config.training_arguments.per_device_train_batch_size = 4;
        config.training_arguments.learning_rate = 0.01;
        config.training_arguments.max_steps = 3;
        config.training_arguments.logging_steps = 1;
        config.training_arguments.save_strategy = lora_dp::train::IntervalStrategy::No;
        config.training_arguments.report_to = vec!["jsonl".into()];
        config
    }

    fn run_dir(&self, name: &str) -> RunDir {
        RunDir::at(self.dir.path().join("runs").join(name)).unwrap()
    }
}

#[test]
fn test_run_saves_adapter_under_last() {
    let fx = Fixture::new(20);
    let run_dir = fx.run_dir("plain");
    let outcome = pipeline::run(&fx.config(), &run_dir, &[]).unwrap();

    assert_eq!(outcome.global_step, 3);
    assert_eq!(outcome.checkpoint, run_dir.path().join("last"));
    assert_eq!(outcome.noise_multiplier, 1.1);
    assert!(outcome.epsilon.is_some_and(|eps| eps > 0.0));
    assert!(outcome.eval.is_none());

    let last = &outcome.checkpoint;
    assert!(last.join(ADAPTER_CONFIG_FILE).is_file());
    assert!(last.join(ADAPTER_WEIGHTS_FILE).is_file());
    let bundle = PeftAdapterBundle::load_peft(last).unwrap();
    assert_eq!(bundle.len(), 2);
    assert_eq!(bundle.config().r, 16);

    let state = TrainerState::load(last).unwrap();
    assert_eq!(state.global_step, 3);
    assert!(last.join(TRAINER_STATE_FILE).is_file());
    assert!(run_dir.meta_dir().join("config.yaml").is_file());
    assert!(run_dir.path().join(METRICS_FILE).is_file());
}

#[test]
fn test_run_with_eval_split_reports_eval_metrics() {
    let fx = Fixture::new(40);
    let mut config = fx.config();
    config.train.evaluate_split = true;
    let outcome = pipeline::run(&config, &fx.run_dir("eval"), &[]).unwrap();

    let eval = outcome.eval.expect("eval metrics");
    // 5% of 40 rows
    assert_eq!(eval.samples, 2);
    assert!(eval.eval_loss.is_finite() && eval.eval_loss > 0.0);
    assert!((eval.perplexity - eval.eval_loss.exp()).abs() < 1e-9);
}

#[test]
fn test_run_with_poisson_sampling_and_target_epsilon() {
    let fx = Fixture::new(40);
    let mut config = fx.config();
    config.privacy.poisson_sampling = true;
    config.privacy.target_epsilon = Some(5.0);
    let outcome = pipeline::run(&config, &fx.run_dir("calibrated"), &[]).unwrap();

    assert_ne!(outcome.noise_multiplier, 1.1);
    let eps = outcome.epsilon.expect("epsilon");
    assert!(eps <= 5.0 + 1e-6, "eps {eps}");
}

#[test]
fn test_missing_model_aborts_before_training() {
    let fx = Fixture::new(10);
    let mut config = fx.config();
    config.model.name = "absent".into();
    let run_dir = fx.run_dir("missing");
    let err = pipeline::run(&config, &run_dir, &[]).unwrap_err();
    assert!(matches!(err, lora_dp::Error::Model(_)), "{err}");
    assert!(!run_dir.checkpoint_path().exists());
}

#[test]
fn test_run_from_composed_yaml() {
    let fx = Fixture::new(20);
    let conf = fx.dir.path().join("conf");
    fs::create_dir_all(&conf).unwrap();
    let yaml = format!(
        "dataset:\n  name: toy\n  root: {root}/data\nmodel:\n  name: tiny-lm\n  root: {root}/models\n  \
         tokenizer:\n    template: \"Q: {{instruction}}\\nA: {{output}}\"\n  \
         lora:\n    target_modules: [v_proj]\ntrain:\n  seq_length: 32\ntraining_arguments:\n  \
         per_device_train_batch_size: 5\n  report_to: none\n  save_strategy: \"no\"\n",
        root = fx.dir.path().display()
    );
    fs::write(conf.join("config.yaml"), yaml).unwrap();

    let overrides = vec![
        "+training_arguments.max_steps=2".to_string(),
        "+privacy.noise_multiplier=0.8".to_string(),
    ];
    let config = load_config(&conf, "config", &overrides).unwrap();
    assert_eq!(config.model.tokenizer.template.as_deref(), Some("Q: {instruction}\nA: {output}"));
    let run_dir = fx.run_dir("yaml");
    let outcome = pipeline::run(&config, &run_dir, &overrides).unwrap();

    assert_eq!(outcome.global_step, 2);
    assert_eq!(outcome.noise_multiplier, 0.8);
    let saved = fs::read_to_string(run_dir.meta_dir().join("overrides.yaml")).unwrap();
    assert!(saved.contains("privacy.noise_multiplier=0.8"));
    assert!(!run_dir.path().join(METRICS_FILE).exists());
}
