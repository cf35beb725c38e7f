//! Configuration composition: YAML file, then overrides, then schema

use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::overrides::{apply_overrides, parse_overrides};
use super::schema::RunConfig;
use super::validate::validate_config;

/// Resolve `<config_path>/<config_name>.yaml`, accepting a name that already
/// carries the extension
pub fn config_file(config_path: &Path, config_name: &str) -> PathBuf {
    if Path::new(config_name).extension().is_some() {
        config_path.join(config_name)
    } else {
        config_path.join(format!("{config_name}.yaml"))
    }
}

/// Read the config file and apply overrides, without schema checks
pub fn compose(
    config_path: &Path,
    config_name: &str,
    overrides: &[String],
) -> Result<Value, ConfigError> {
    let path = config_file(config_path, config_name);
    if !path.exists() {
        return Err(ConfigError::NotFound(path));
    }
    let text = fs::read_to_string(&path)
        .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
    let mut root: Value = serde_yaml::from_str(&text)
        .map_err(|e| ConfigError::Parse { path: path.clone(), message: e.to_string() })?;
    if root.is_null() {
        root = Value::Mapping(Default::default());
    }

    let parsed = parse_overrides(overrides)?;
    apply_overrides(&mut root, &parsed)?;
    Ok(root)
}

/// Compose, deserialize and validate the run configuration
///
/// # Example
///
/// ```no_run
/// use lora_dp::config::load_config;
///
/// let config = load_config("conf".as_ref(), "config", &["train.seq_length=256".into()])?;
/// assert_eq!(config.train.seq_length, 256);
/// # Ok::<(), lora_dp::config::ConfigError>(())
/// ```
pub fn load_config(
    config_path: &Path,
    config_name: &str,
    overrides: &[String],
) -> Result<RunConfig, ConfigError> {
    let root = compose(config_path, config_name, overrides)?;
    let config = from_value(root)?;
    validate_config(&config)?;
    tracing::debug!(
        dataset = %config.dataset.name,
        model = %config.model.name,
        overrides = overrides.len(),
        "configuration composed"
    );
    Ok(config)
}

/// Deserialize a composed tree
pub fn from_value(root: Value) -> Result<RunConfig, ConfigError> {
    serde_yaml::from_value(root).map_err(|e| ConfigError::Schema(e.to_string()))
}

/// Render a configuration the way it is printed at startup
pub fn to_yaml(config: &RunConfig) -> Result<String, ConfigError> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::Schema(e.to_string()))
}
