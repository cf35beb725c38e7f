//! In-memory row dataset and the local loader

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::DataError;

/// Environment variable with the default dataset root
pub const DATASETS_ENV: &str = "LORA_DP_DATASETS";

/// One example: a JSON object
pub type Row = Map<String, Value>;

/// Named, ordered collection of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self { name: name.into(), rows }
    }

    /// Build from JSON values; each must be an object
    pub fn from_values(name: impl Into<String>, values: Vec<Value>) -> Result<Self, DataError> {
        let name = name.into();
        let rows = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::Object(map) => Ok(map),
                _ => Err(DataError::NotAnObject { path: PathBuf::from(&name), line: i + 1 }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name, rows })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Rows at `indices`, in that order
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            rows: indices.iter().filter_map(|&i| self.rows.get(i).cloned()).collect(),
        }
    }

    /// Union of the keys across all rows, sorted
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.rows.iter().flat_map(|r| r.keys().cloned()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// String value of `field` in row `index`; non-string scalars are rendered
    pub fn text(&self, index: usize, field: &str) -> Result<String, DataError> {
        let missing = || DataError::MissingField { field: field.to_string(), row: index };
        let value = self.rows.get(index).and_then(|r| r.get(field)).ok_or_else(missing)?;
        Ok(match value {
            Value::String(s) => s.clone(),
            Value::Null => return Err(missing()),
            other => other.to_string(),
        })
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Load `split` of the dataset called `name`
///
/// `name` is tried as a path first, then under `root`. A directory must hold
/// `<split>.jsonl`, `<split>.json` or `data/<split>.jsonl`.
pub fn load_dataset(name: &str, split: &str, root: Option<&Path>) -> Result<Dataset, DataError> {
    let mut bases = vec![PathBuf::from(name)];
    if let Some(root) = root {
        bases.push(root.join(name));
    }

    let mut tried = Vec::new();
    for base in bases {
        for candidate in candidates(&base, split) {
            if candidate.is_file() {
                let rows = read_rows(&candidate)?;
                tracing::info!(
                    dataset = name,
                    split,
                    path = %candidate.display(),
                    rows = rows.len(),
                    "dataset loaded"
                );
                return Ok(Dataset::new(name, rows));
            }
            tried.push(candidate);
        }
    }
    Err(DataError::NotFound { name: name.to_string(), tried })
}

fn candidates(base: &Path, split: &str) -> Vec<PathBuf> {
    if base.is_dir() {
        vec![
            base.join(format!("{split}.jsonl")),
            base.join(format!("{split}.json")),
            base.join("data").join(format!("{split}.jsonl")),
        ]
    } else {
        vec![base.to_path_buf(), base.with_extension("jsonl")]
    }
}

fn read_rows(path: &Path) -> Result<Vec<Row>, DataError> {
    let content = fs::read_to_string(path)
        .map_err(|source| DataError::Io { path: path.to_path_buf(), source })?;

    let is_array = path.extension().is_some_and(|e| e == "json")
        && content.trim_start().starts_with('[');
    if is_array {
        let values: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
            DataError::InvalidJson { path: path.to_path_buf(), line: e.line(), message: e.to_string() }
        })?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, v)| into_row(v, path, i + 1))
            .collect();
    }

    let mut rows = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| DataError::InvalidJson {
            path: path.to_path_buf(),
            line: line_num + 1,
            message: e.to_string(),
        })?;
        rows.push(into_row(value, path, line_num + 1)?);
    }
    Ok(rows)
}

fn into_row(value: Value, path: &Path, line: usize) -> Result<Row, DataError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(DataError::NotAnObject { path: path.to_path_buf(), line }),
    }
}
