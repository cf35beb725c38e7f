//! Experiment tracking
//!
//! Training logs are fanned out to pluggable [`MetricsSink`]s chosen from
//! `report_to`. The project name is exported as `WANDB_PROJECT` before the run
//! starts so external reporters pick it up.
//!
//! # Example
//!
//! ```
//! use lora_dp::tracking::{LogEvent, MemorySink, Tracker};
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let sink = MemorySink::new();
//! let events = sink.handle();
//! let mut tracker = Tracker::new("LLM_memorization");
//! tracker.add_sink(Box::new(sink));
//!
//! tracker.log(LogEvent::new(10, 0.5).with("loss", 2.3))?;
//! tracker.finish()?;
//! assert_eq!(events.lock().unwrap().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod sink;


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use sink::{JsonlSink, MemorySink, MetricsSink};

/// Environment variable naming the tracking project
pub const PROJECT_ENV: &str = "WANDB_PROJECT";

/// File written by [`JsonlSink`] inside the run directory
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Export the project name for external reporters
pub fn set_project_env(project: &str) {
    std::env::set_var(PROJECT_ENV, project);
    tracing::info!(project, "{PROJECT_ENV} set");
}

/// Errors from tracking operations
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;

/// One logging event: a step, the fractional epoch and named values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub step: u64,
    pub epoch: f64,
    pub values: BTreeMap<String, f64>,
    /// RFC 3339 wall-clock time
    pub timestamp: String,
}

impl LogEvent {
    pub fn new(step: u64, epoch: f64) -> Self {
        Self {
            step,
            epoch,
            values: BTreeMap::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Add a named value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Fan-out over the configured sinks
pub struct Tracker {
    project: String,
    sinks: Vec<Box<dyn MetricsSink>>,
    history: Vec<LogEvent>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("project", &self.project)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("events", &self.history.len())
            .finish()
    }
}

impl Tracker {
    /// Tracker with no sinks; events are only kept in memory
    pub fn new(project: impl Into<String>) -> Self {
        Self { project: project.into(), sinks: Vec::new(), history: Vec::new() }
    }

    /// Build sinks from `report_to` names
    ///
    /// `none` disables reporting, `all` and `jsonl` write `metrics.jsonl` in
    /// `run_dir`. Other backend names are not available here and are skipped
    /// with a warning.
    pub fn from_report_to(project: &str, report_to: &[String], run_dir: &Path) -> Result<Self> {
        let mut tracker = Self::new(project);
        let mut jsonl = false;
        for name in report_to {
            match name.as_str() {
                "none" => return Ok(Self::new(project)),
                "all" | "jsonl" => jsonl = true,
                other => tracing::warn!(backend = other, "reporting backend not available, skipping"),
            }
        }
        if jsonl {
            tracker.add_sink(Box::new(JsonlSink::create(run_dir.join(METRICS_FILE))?));
        }
        Ok(tracker)
    }

    pub fn add_sink(&mut self, sink: Box<dyn MetricsSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Every event logged so far
    #[must_use]
    pub fn history(&self) -> &[LogEvent] {
        &self.history
    }

    /// Send an event to every sink
    pub fn log(&mut self, event: LogEvent) -> Result<()> {
        for sink in &mut self.sinks {
            sink.log(&event)?;
        }
        self.history.push(event);
        Ok(())
    }

    /// Flush every sink
    pub fn finish(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        Ok(())
    }
}
