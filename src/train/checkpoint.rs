//! Intermediate checkpoint directories and their rotation

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix of intermediate checkpoint directories
pub const CHECKPOINT_PREFIX: &str = "checkpoint";

/// `<output_dir>/checkpoint-<step>`
pub fn checkpoint_dir(output_dir: &Path, step: u64) -> PathBuf {
    output_dir.join(format!("{CHECKPOINT_PREFIX}-{step}"))
}

/// Checkpoint directories under `output_dir`, oldest step first
pub fn sorted_checkpoints(output_dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(output_dir).map_err(|e| Error::io(output_dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(output_dir, e))?.path();
        let step = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
            .and_then(|n| n.strip_prefix('-'))
            .and_then(|n| n.parse::<u64>().ok());
        if let (Some(step), true) = (step, path.is_dir()) {
            found.push((step, path));
        }
    }
    found.sort_by_key(|(step, _)| *step);
    Ok(found)
}

/// Delete the oldest checkpoints so at most `limit` remain
///
/// `keep` (the best checkpoint) is never deleted. Returns the removed paths.
pub fn rotate_checkpoints(output_dir: &Path, limit: usize, keep: Option<&Path>) -> Result<Vec<PathBuf>> {
    let checkpoints = sorted_checkpoints(output_dir)?;
    let excess = checkpoints.len().saturating_sub(limit.max(1));
    let mut removed = Vec::new();
    for (_, path) in checkpoints.into_iter().filter(|(_, p)| Some(p.as_path()) != keep).take(excess) {
        fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(checkpoint = %path.display(), "deleted old checkpoint");
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make(dir: &Path, steps: &[u64]) {
        for &s in steps {
            fs::create_dir_all(checkpoint_dir(dir, s)).unwrap();
        }
    }

    #[test]
    fn test_sorted_by_step_not_name() {
        let dir = TempDir::new().unwrap();
        make(dir.path(), &[10, 2, 100]);
        fs::create_dir_all(dir.path().join("last")).unwrap();
        fs::write(dir.path().join("checkpoint-7"), "not a dir").unwrap();
        let steps: Vec<u64> = sorted_checkpoints(dir.path()).unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(steps, vec![2, 10, 100]);
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let dir = TempDir::new().unwrap();
        make(dir.path(), &[1, 2, 3, 4]);
        let removed = rotate_checkpoints(dir.path(), 2, None).unwrap();
        assert_eq!(removed, vec![checkpoint_dir(dir.path(), 1), checkpoint_dir(dir.path(), 2)]);
        assert!(checkpoint_dir(dir.path(), 4).is_dir());
    }

    #[test]
    fn test_rotation_spares_best() {
        let dir = TempDir::new().unwrap();
        make(dir.path(), &[1, 2, 3]);
        let best = checkpoint_dir(dir.path(), 1);
        rotate_checkpoints(dir.path(), 2, Some(&best)).unwrap();
        assert!(best.is_dir());
        assert!(!checkpoint_dir(dir.path(), 2).exists());
        assert!(checkpoint_dir(dir.path(), 3).is_dir());
    }

    #[test]
    fn test_missing_output_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(sorted_checkpoints(&dir.path().join("nope")).unwrap().is_empty());
    }
}
