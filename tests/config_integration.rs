//! Composition of the shipped `conf/config.yaml`

use std::path::PathBuf;

use lora_dp::config::{load_config, to_yaml, ConfigError};
use lora_dp::lora::build_lora_config;
use lora_dp::train::IntervalStrategy;

fn conf_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("conf")
}

#[test]
fn test_default_config_composes() {
    let config = load_config(&conf_dir(), "config", &[]).unwrap();
    assert_eq!(config.dataset.name, "imdb");
    assert_eq!(config.model.lora.target_modules, vec!["q_proj", "v_proj"]);
    assert!(!config.train.evaluate_split);
    assert_eq!(config.privacy.noise_multiplier, 1.1);
    assert_eq!(config.privacy.delta, 1e-5);
    assert_eq!(config.tracking.project, "LLM_memorization");
    assert_eq!(config.training_arguments.save_strategy, IntervalStrategy::No);
    assert_eq!(config.training_arguments.max_steps(), None);
}

#[test]
fn test_overrides_apply_in_order() {
    let overrides: Vec<String> = [
        "train.evaluate_split=true",
        "+training_arguments.max_steps=10",
        "++privacy.target_epsilon=3.0",
        "model.lora.target_modules=[q_proj]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let config = load_config(&conf_dir(), "config.yaml", &overrides).unwrap();
    assert!(config.train.evaluate_split);
    assert_eq!(config.training_arguments.max_steps(), Some(10));
    assert_eq!(config.privacy.target_epsilon, Some(3.0));
    assert_eq!(build_lora_config(&config).target_modules, vec!["q_proj"]);
}

#[test]
fn test_bad_overrides_are_rejected() {
    let err = load_config(&conf_dir(), "config", &["train.no_such_key=1".into()]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingKey(_)), "{err}");

    let err =
        load_config(&conf_dir(), "config", &["+train.seq_length=3".into()]).unwrap_err();
    assert!(matches!(err, ConfigError::KeyExists(_)), "{err}");

    assert!(load_config(&conf_dir(), "config", &["privacy.noise_multiplier=-1".into()]).is_err());
    assert!(load_config(&conf_dir(), "missing", &[]).is_err());
}

#[test]
fn test_printed_yaml_recomposes_identically() {
    let config = load_config(&conf_dir(), "config", &[]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), to_yaml(&config).unwrap()).unwrap();
    assert_eq!(load_config(dir.path(), "config", &[]).unwrap(), config);
}
