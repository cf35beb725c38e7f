//! Command-line overrides for the composed configuration
//!
//! Grammar, applied in order to the YAML tree before deserialization:
//!
//! | form          | effect                                     |
//! |---------------|--------------------------------------------|
//! | `a.b=v`       | replace an existing key                    |
//! | `+a.b=v`      | add a key that must not exist yet          |
//! | `++a.b=v`     | add or replace                             |
//! | `~a.b`        | delete a key                               |
//! | `~a.b=v`      | delete a key only if its value equals `v`  |
//!
//! Values are parsed as YAML, so `lr=1e-4` is a float, `flag=true` a bool and
//! `mods=[q_proj,v_proj]` a sequence. Anything YAML rejects stays a string.

use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

/// Override operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOp {
    Set,
    Add,
    ForceAdd,
    Delete,
}

/// One parsed override
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub op: OverrideOp,
    pub key: Vec<String>,
    pub value: Option<Value>,
    raw: String,
}

impl Override {
    /// Dotted key path
    pub fn key_path(&self) -> String {
        self.key.join(".")
    }

    /// Apply to a YAML tree
    pub fn apply(&self, root: &mut Value) -> Result<(), ConfigError> {
        let Some((last, parents)) = self.key.split_last() else {
            return Err(ConfigError::InvalidOverride(self.raw.clone()));
        };
        let creates = matches!(self.op, OverrideOp::Add | OverrideOp::ForceAdd);

        let mut node = root;
        for segment in parents {
            let map = node
                .as_mapping_mut()
                .ok_or_else(|| ConfigError::InvalidOverride(self.raw.clone()))?;
            if !map.contains_key(segment.as_str()) {
                if !creates {
                    return Err(self.missing());
                }
                map.insert(Value::String(segment.clone()), Value::Mapping(Mapping::new()));
            }
            node = map.get_mut(segment.as_str()).ok_or_else(|| self.missing())?;
        }

        let map = node
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::InvalidOverride(self.raw.clone()))?;
        let value = self.value.clone().unwrap_or(Value::Null);

        match self.op {
            OverrideOp::Set => {
                let slot = map.get_mut(last.as_str()).ok_or_else(|| self.missing())?;
                *slot = value;
            }
            OverrideOp::Add => {
                if map.contains_key(last.as_str()) {
                    return Err(ConfigError::KeyExists(self.key_path()));
                }
                map.insert(Value::String(last.clone()), value);
            }
            OverrideOp::ForceAdd => {
                map.insert(Value::String(last.clone()), value);
            }
            OverrideOp::Delete => {
                let current = map
                    .get(last.as_str())
                    .ok_or_else(|| ConfigError::DeleteMissing(self.key_path()))?;
                if let Some(expected) = &self.value {
                    if current != expected {
                        return Err(ConfigError::InvalidOverride(self.raw.clone()));
                    }
                }
                map.remove(last.as_str());
            }
        }
        Ok(())
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingKey(self.key_path())
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidOverride(raw.to_string());

        let (op, rest) = if let Some(rest) = raw.strip_prefix("++") {
            (OverrideOp::ForceAdd, rest)
        } else if let Some(rest) = raw.strip_prefix('+') {
            (OverrideOp::Add, rest)
        } else if let Some(rest) = raw.strip_prefix('~') {
            (OverrideOp::Delete, rest)
        } else {
            (OverrideOp::Set, raw)
        };

        let (key, value) = match rest.split_once('=') {
            Some((key, value)) => (key, Some(parse_value(value))),
            None if op == OverrideOp::Delete => (rest, None),
            None => return Err(invalid()),
        };

        let key: Vec<String> = key.split('.').map(str::to_string).collect();
        if key.iter().any(|s| !is_valid_segment(s)) {
            return Err(invalid());
        }

        Ok(Self { op, key, value, raw: raw.to_string() })
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse every override, failing on the first malformed one
pub fn parse_overrides(raw: &[String]) -> Result<Vec<Override>, ConfigError> {
    raw.iter().map(|s| s.parse()).collect()
}

/// Apply overrides in order
pub fn apply_overrides(root: &mut Value, overrides: &[Override]) -> Result<(), ConfigError> {
    for o in overrides {
        o.apply(root)?;
    }
    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_value(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
