//! Run output directory
//!
//! Every run writes under one directory expanded from a strftime template:
//!
//! ```text
//! outputs/2026-10-18/14-03-22/
//! ├── .lora-dp/config.yaml      composed configuration
//! ├── .lora-dp/overrides.yaml   command-line overrides
//! ├── metrics.jsonl
//! ├── checkpoint-<step>/
//! └── last/                     final adapter
//! ```

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use std::fmt::{Display, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{to_yaml, ConfigError, RunConfig};
use crate::error::{Error, Result};

/// Subdirectory holding the final checkpoint
pub const LAST_CHECKPOINT: &str = "last";

/// Subdirectory for run metadata
pub const META_DIR: &str = ".lora-dp";

/// A created run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Expand `template` with `now` and create the directory
    pub fn create<Tz>(template: &str, now: DateTime<Tz>) -> Result<Self>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let path = PathBuf::from(expand_template(template, &now)?);
        Self::at(path)
    }

    /// Use an explicit directory, creating it if needed
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self { path })
    }

    /// The run's output directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the final adapter is saved: always `<output dir>/last`
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.path.join(LAST_CHECKPOINT)
    }

    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.path.join(META_DIR)
    }

    /// Persist the composed configuration and the overrides that produced it
    pub fn save_config(&self, config: &RunConfig, overrides: &[String]) -> Result<()> {
        let meta = self.meta_dir();
        fs::create_dir_all(&meta).map_err(|e| Error::io(&meta, e))?;

        let config_path = meta.join("config.yaml");
        fs::write(&config_path, to_yaml(config)?).map_err(|e| Error::io(&config_path, e))?;

        let overrides_path = meta.join("overrides.yaml");
        let text = serde_yaml::to_string(overrides)
            .map_err(|e| ConfigError::Schema(e.to_string()))?;
        fs::write(&overrides_path, text).map_err(|e| Error::io(&overrides_path, e))?;
        Ok(())
    }
}

fn expand_template<Tz>(template: &str, now: &DateTime<Tz>) -> Result<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::invalid("run.dir", format!("bad strftime template {template:?}")).into());
    }
    let mut out = String::new();
    write!(out, "{}", now.format_with_items(items.into_iter()))
        .map_err(|_| ConfigError::invalid("run.dir", format!("cannot format {template:?}")))?;
    if out.trim().is_empty() {
        return Err(ConfigError::invalid("run.dir", "expands to an empty path").into());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn test_template_expansion() {
        let dir = TempDir::new().unwrap();
        let template = format!("{}/outputs/%Y-%m-%d/%H-%M-%S", dir.path().display());
        let run = RunDir::create(&template, fixed_time()).unwrap();
        assert_eq!(run.path(), dir.path().join("outputs/2024-03-09/07-05-01"));
        assert!(run.path().is_dir());
    }

    #[test]
    fn test_checkpoint_path_is_last() {
        let dir = TempDir::new().unwrap();
        for sub in ["a", "b/c", "d/e/f"] {
            let run = RunDir::at(dir.path().join(sub)).unwrap();
            assert_eq!(run.checkpoint_path(), run.path().join("last"));
        }
    }

    #[test]
    fn test_bad_template_rejected() {
        assert!(expand_template("out/%Q", &fixed_time()).is_err());
        assert!(expand_template("  ", &fixed_time()).is_err());
    }

    #[test]
    fn test_save_config() {
        let dir = TempDir::new().unwrap();
        let run = RunDir::at(dir.path()).unwrap();
        let config = RunConfig::new("imdb", "tiny-lm", vec!["q_proj".into()]);
        run.save_config(&config, &["train.evaluate_split=true".into()]).unwrap();

        let text = fs::read_to_string(run.meta_dir().join("config.yaml")).unwrap();
        let back: RunConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, config);

        let text = fs::read_to_string(run.meta_dir().join("overrides.yaml")).unwrap();
        let overrides: Vec<String> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(overrides, vec!["train.evaluate_split=true"]);
    }
}
