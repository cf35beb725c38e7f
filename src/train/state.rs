//! `trainer_state.json`: progress and log history of a run

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tracking::LogEvent;

/// File name inside a checkpoint directory
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

/// Progress of the training loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Fractional epoch reached
    pub epoch: f64,
    pub global_step: u64,
    pub max_steps: u64,
    pub num_train_epochs: u64,
    pub logging_steps: usize,
    pub save_steps: usize,
    pub train_batch_size: usize,
    /// Lowest eval loss seen so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_metric: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_model_checkpoint: Option<String>,
    pub log_history: Vec<LogEvent>,
}

impl TrainerState {
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(TRAINER_STATE_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?).map_err(|e| Error::io(&path, e))
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(TRAINER_STATE_FILE);
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Record an eval loss; returns whether it is the best so far
    pub fn observe_eval_loss(&mut self, loss: f64) -> bool {
        match self.best_metric {
            Some(best) if best <= loss => false,
            _ => {
                self.best_metric = Some(loss);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let state = TrainerState {
            epoch: 1.5,
            global_step: 12,
            log_history: vec![LogEvent::new(12, 1.5).with("loss", 2.0)],
            ..Default::default()
        };
        state.save(dir.path()).unwrap();
        assert_eq!(TrainerState::load(dir.path()).unwrap(), state);
    }

    #[test]
    fn test_best_metric_tracks_minimum() {
        let mut state = TrainerState::default();
        assert!(state.observe_eval_loss(3.0));
        assert!(!state.observe_eval_loss(3.5));
        assert!(state.observe_eval_loss(2.0));
        assert_eq!(state.best_metric, Some(2.0));
    }
}
