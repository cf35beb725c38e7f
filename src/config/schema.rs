//! YAML schema for a fine-tuning run
//!
//! The file layout mirrors the composed run configuration:
//!
//! ```yaml
//! dataset:
//!   name: imdb
//! model:
//!   name: tiny-lm
//!   tokenizer:
//!     template: "{text}"
//!   lora:
//!     target_modules: [q_proj, v_proj]
//! train:
//!   evaluate_split: true
//!   seq_length: 128
//! training_arguments:
//!   learning_rate: 0.0002
//!   num_train_epochs: 1
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::train::TrainingArguments;

/// Deserialize a bool from either a YAML boolean (`true`) or a quoted string (`"true"`).
pub(crate) fn deserialize_bool_lenient<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dataset to fine-tune on
    pub dataset: DatasetSection,

    /// Base model, tokenizer and adapter targets
    pub model: ModelSection,

    /// Split and sequence options
    #[serde(default)]
    pub train: TrainSection,

    /// Passed verbatim into [`TrainingArguments`]
    #[serde(default)]
    pub training_arguments: TrainingArguments,

    /// DP-SGD parameters
    #[serde(default)]
    pub privacy: PrivacySection,

    /// Experiment tracking
    #[serde(default)]
    pub tracking: TrackingSection,

    /// Output directory layout
    #[serde(default)]
    pub run: RunSection,
}

impl RunConfig {
    /// Minimal configuration with every optional section at its default
    pub fn new(
        dataset: impl Into<String>,
        model: impl Into<String>,
        target_modules: Vec<String>,
    ) -> Self {
        Self {
            dataset: DatasetSection {
                name: dataset.into(),
                split: default_split(),
                root: None,
            },
            model: ModelSection {
                name: model.into(),
                root: None,
                tokenizer: TokenizerSection::default(),
                lora: LoraSection { target_modules },
            },
            train: TrainSection::default(),
            training_arguments: TrainingArguments::default(),
            privacy: PrivacySection::default(),
            tracking: TrackingSection::default(),
            run: RunSection::default(),
        }
    }
}

/// Dataset reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSection {
    /// Local path, or a name resolved under `root`
    pub name: String,

    /// Split to load
    #[serde(default = "default_split")]
    pub split: String,

    /// Directory that dataset names are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

fn default_split() -> String {
    "train".to_string()
}

/// Base model reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Local path, or a name resolved under `root`
    pub name: String,

    /// Directory that model names are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Tokenizer, prompt formatting and collation options
    #[serde(default)]
    pub tokenizer: TokenizerSection,

    /// Adapter placement
    pub lora: LoraSection,
}

/// Which tokenizer implementation to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// `tokenizer.json` in the model directory when present, bytes otherwise
    #[default]
    Auto,
    /// Byte-level vocabulary with pad/bos/eos
    Byte,
    /// HuggingFace `tokenizer.json`
    Hf,
}

/// Side that short sequences are padded on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingSide {
    #[default]
    Right,
    Left,
}

/// Tokenizer and prompt formatting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerSection {
    #[serde(default)]
    pub kind: TokenizerKind,

    /// Prompt template with `{field}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Marker after which tokens are trained on; everything before is masked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_template: Option<String>,

    /// Field used verbatim when no template applies
    #[serde(default = "default_text_field")]
    pub text_field: String,

    /// Instruction field for the built-in instruction template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_field: Option<String>,

    /// Response field for the built-in instruction template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_field: Option<String>,

    /// Append the end-of-sequence token
    #[serde(default = "default_true", deserialize_with = "deserialize_bool_lenient")]
    pub add_eos: bool,

    #[serde(default)]
    pub padding_side: PaddingSide,
}

impl Default for TokenizerSection {
    fn default() -> Self {
        Self {
            kind: TokenizerKind::default(),
            template: None,
            response_template: None,
            text_field: default_text_field(),
            instruction_field: None,
            response_field: None,
            add_eos: true,
            padding_side: PaddingSide::default(),
        }
    }
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

/// Adapter placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSection {
    /// Module names (or name suffixes) to wrap with LoRA
    pub target_modules: Vec<String>,
}

/// Split and sequence options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSection {
    /// Hold out 5% of the dataset for evaluation
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub evaluate_split: bool,

    /// Tokens kept per example after formatting
    #[serde(default = "default_seq_length")]
    pub seq_length: usize,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self { evaluate_split: false, seq_length: default_seq_length() }
    }
}

fn default_seq_length() -> usize {
    512
}

/// DP-SGD parameters handed to the privacy engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacySection {
    #[serde(default = "default_noise_multiplier")]
    pub noise_multiplier: f64,

    /// Per-sample clipping bound
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,

    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub poisson_sampling: bool,

    /// Target delta for reporting epsilon
    #[serde(default = "default_delta")]
    pub delta: f64,

    /// Calibrate the noise multiplier to this epsilon instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_epsilon: Option<f64>,

    /// Draw noise from OS entropy rather than the training seed
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub secure_rng: bool,
}

impl Default for PrivacySection {
    fn default() -> Self {
        Self {
            noise_multiplier: default_noise_multiplier(),
            max_grad_norm: default_max_grad_norm(),
            poisson_sampling: false,
            delta: default_delta(),
            target_epsilon: None,
            secure_rng: false,
        }
    }
}

fn default_noise_multiplier() -> f64 {
    1.1
}

fn default_max_grad_norm() -> f64 {
    1.0
}

fn default_delta() -> f64 {
    1e-5
}

/// Experiment tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSection {
    /// Project name exported as `WANDB_PROJECT`
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self { project: default_project() }
    }
}

fn default_project() -> String {
    "LLM_memorization".to_string()
}

/// Output directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    /// strftime template for the run directory
    #[serde(default = "default_run_dir")]
    pub dir: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self { dir: default_run_dir() }
    }
}

fn default_run_dir() -> String {
    "outputs/%Y-%m-%d/%H-%M-%S".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
dataset:
  name: imdb
model:
  name: tiny-lm
  lora:
    target_modules: [q_proj, v_proj]
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.dataset.split, "train");
        assert_eq!(config.model.lora.target_modules, vec!["q_proj", "v_proj"]);
        assert!(!config.train.evaluate_split);
        assert_eq!(config.train.seq_length, 512);
        assert_eq!(config.privacy.noise_multiplier, 1.1);
        assert_eq!(config.privacy.max_grad_norm, 1.0);
        assert!(!config.privacy.poisson_sampling);
        assert_eq!(config.tracking.project, "LLM_memorization");
        assert_eq!(config.run.dir, "outputs/%Y-%m-%d/%H-%M-%S");
        assert_eq!(config.model.tokenizer.text_field, "text");
        assert!(config.model.tokenizer.add_eos);
    }

    #[test]
    fn test_quoted_bool_accepted() {
        let yaml = r#"
dataset: {name: d}
model: {name: m, lora: {target_modules: [q_proj]}}
train:
  evaluate_split: "true"
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.train.evaluate_split);
    }

    #[test]
    fn test_bad_bool_string_rejected() {
        let yaml = r#"
dataset: {name: d}
model: {name: m, lora: {target_modules: [q_proj]}}
train:
  evaluate_split: "maybe"
"#;
        assert!(serde_yaml::from_str::<RunConfig>(yaml).is_err());
    }

    #[test]
    fn test_missing_target_modules_rejected() {
        let yaml = "dataset: {name: d}\nmodel: {name: m, lora: {}}\n";
        assert!(serde_yaml::from_str::<RunConfig>(yaml).is_err());
    }

    #[test]
    fn test_new_matches_yaml_defaults() {
        let yaml = "dataset: {name: d}\nmodel: {name: m, lora: {target_modules: [q_proj]}}\n";
        let parsed: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed, RunConfig::new("d", "m", vec!["q_proj".to_string()]));
    }
}
