//! Metrics sinks
//!
//! Provides the `MetricsSink` trait, a JSON-lines file sink and an in-memory
//! sink for tests and embedding.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{LogEvent, Result, TrackingError};

/// Destination for training log events
pub trait MetricsSink {
    /// Short backend name
    fn name(&self) -> &str;

    /// Record one event
    fn log(&mut self, event: &LogEvent) -> Result<()>;

    /// Flush buffered output
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One JSON object per line
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Create (truncate) the file, creating parent directories
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| TrackingError::Io { path: parent.to_path_buf(), source })?;
        }
        let file = File::create(&path)
            .map_err(|source| TrackingError::Io { path: path.clone(), source })?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> TrackingError {
        TrackingError::Io { path: self.path.clone(), source }
    }
}

impl MetricsSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn log(&mut self, event: &LogEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.writer, "{line}").map_err(|e| self.io(e))?;
        // Keep the file readable while a long run is in progress.
        self.writer.flush().map_err(|e| self.io(e))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.io(e))
    }
}

/// Keeps events in a shared buffer
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded events
    pub fn handle(&self) -> Arc<Mutex<Vec<LogEvent>>> {
        Arc::clone(&self.events)
    }
}

impl MetricsSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn log(&mut self, event: &LogEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
