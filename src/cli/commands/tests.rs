use super::*;
use crate::config::{InitModelArgs, RunArgs};
use crate::pipeline::TrainOutcome;
use crate::train::EvalMetrics;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init_args(out: &Path) -> InitModelArgs {
    InitModelArgs {
        out: out.to_path_buf(),
        vocab_size: 259,
        hidden_size: 8,
        layers: 1,
        modules: vec!["q_proj".into(), "v_proj".into()],
        seed: 3,
        with_tokenizer: true,
    }
}

fn quiet(command: Command) -> Cli {
    Cli { command, verbose: false, quiet: true }
}

/// Model, dataset and `conf/config.yaml` under one temp dir
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    run_command(quiet(Command::InitModel(init_args(&dir.path().join("tiny-lm"))))).unwrap();

    let rows: String = (0..12).map(|i| format!("{{\"text\": \"sample number {i}\"}}\n")).collect();
    fs::write(dir.path().join("train.jsonl"), rows).unwrap();

    fs::create_dir_all(dir.path().join("conf")).unwrap();
    let yaml = format!(
        r#"dataset:
  name: {root}/train.jsonl
model:
  name: {root}/tiny-lm
  lora:
    target_modules: [q_proj, v_proj]
train:
  seq_length: 32
  evaluate_split: false
training_arguments:
  per_device_train_batch_size: 4
  learning_rate: 0.01
  save_strategy: "no"
  report_to: none
run:
  dir: {root}/runs/%H-%M-%S
"#,
        root = dir.path().display()
    );
    fs::write(dir.path().join("conf/config.yaml"), yaml).unwrap();
    dir
}

fn run_args(dir: &Path, overrides: &[&str]) -> RunArgs {
    RunArgs {
        config_path: dir.join("conf"),
        config_name: "config".to_string(),
        overrides: overrides.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn test_init_model_writes_checkpoint_and_tokenizer() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("m");
    run_command(quiet(Command::InitModel(init_args(&out)))).unwrap();
    assert!(out.join("config.json").is_file());
    assert!(out.join("model.safetensors").is_file());
    assert!(crate::tokenizer::ByteTokenizer::is_saved_in(&out));
}

#[test]
fn test_init_model_rejects_small_vocab_with_tokenizer() {
    let dir = TempDir::new().unwrap();
    let mut args = init_args(&dir.path().join("m"));
    args.vocab_size = 100;
    assert!(run_command(quiet(Command::InitModel(args))).is_err());
}

#[test]
fn test_validate_and_show() {
    let dir = workspace();
    run_command(quiet(Command::Validate(run_args(dir.path(), &[])))).unwrap();
    run_command(quiet(Command::Show(run_args(dir.path(), &["train.seq_length=16"])))).unwrap();
}

#[test]
fn test_validate_reports_bad_override() {
    let dir = workspace();
    let result =
        run_command(quiet(Command::Validate(run_args(dir.path(), &["+privacy.delta=2.0"]))));
    assert!(matches!(result, Err(crate::Error::Config(_))));
}

#[test]
fn test_train_saves_adapter_in_last() {
    let dir = workspace();
    run_command(quiet(Command::Train(run_args(
        dir.path(),
        &["+training_arguments.max_steps=2", "train.evaluate_split=true"],
    ))))
    .unwrap();

    let runs: Vec<PathBuf> =
        fs::read_dir(dir.path().join("runs")).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("last/adapter_config.json").is_file());
    assert!(runs[0].join("last/adapter_model.safetensors").is_file());
}

#[test]
fn test_summary_lists_privacy_and_lora() {
    let config = crate::config::RunConfig::new("imdb", "tiny-lm", vec!["q_proj".into()]);
    let summary = format_summary(&config);
    assert!(summary.contains("r=16 alpha=32"));
    assert!(summary.contains("σ=1.1"));
    assert!(summary.contains("sampling: shuffle"));
    assert!(summary.contains("4-bit"));
}

#[test]
fn test_outcome_report() {
    let outcome = TrainOutcome {
        global_step: 7,
        train_loss: 2.5,
        eval: Some(EvalMetrics { eval_loss: 2.0, perplexity: 2f64.exp(), samples: 3, tokens: 40 }),
        epsilon: Some(1.25),
        delta: 1e-5,
        noise_multiplier: 1.1,
        checkpoint: PathBuf::from("out/last"),
    };
    let text = format_outcome(&outcome);
    assert!(text.contains("steps:            7"));
    assert!(text.contains("eval loss:        2.0000"));
    assert!(text.contains("ε = 1.2500"));
    assert!(text.contains("out/last"));

    let untracked = TrainOutcome { epsilon: None, eval: None, ..outcome };
    assert!(format_outcome(&untracked).contains("not tracked"));
}
