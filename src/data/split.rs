//! Seeded train/test partitioning

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::dataset::Dataset;
use super::DataError;

/// Fraction held out when a run evaluates
pub const EVAL_FRACTION: f64 = 0.05;

/// Seed used for the held-out split
pub const SPLIT_SEED: u64 = 1122;

/// Result of [`Dataset::train_test_split`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Dataset,
    pub test: Dataset,
}

/// Datasets handed to the trainer
#[derive(Debug, Clone, PartialEq)]
pub struct RunSplit {
    pub train: Dataset,
    /// Absent when evaluation is disabled
    pub eval: Option<Dataset>,
}

impl Dataset {
    /// Shuffle with `seed`, then take the first `ceil(test_size * n)` rows as
    /// the test set and the rest as the train set
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<TrainTestSplit, DataError> {
        let n = self.len();
        let invalid = |message: &str| DataError::InvalidSplit {
            n,
            test_size,
            message: message.to_string(),
        };
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(invalid("test_size must be in (0, 1)"));
        }
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(invalid("resulting train set would be empty"));
        }

        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test_idx, train_idx) = permutation.split_at(n_test);

        Ok(TrainTestSplit { train: self.select(train_idx), test: self.select(test_idx) })
    }
}

/// Partition for a run: 95/5 with seed 1122 when `evaluate_split`, otherwise
/// the whole dataset trains and there is no eval set
pub fn split_for_run(dataset: Dataset, evaluate_split: bool) -> Result<RunSplit, DataError> {
    if dataset.is_empty() {
        return Err(DataError::Empty(dataset.name().to_string()));
    }
    if !evaluate_split {
        return Ok(RunSplit { train: dataset, eval: None });
    }
    let split = dataset.train_test_split(EVAL_FRACTION, SPLIT_SEED)?;
    tracing::info!(train = split.train.len(), eval = split.test.len(), "held out eval split");
    Ok(RunSplit { train: split.train, eval: Some(split.test) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn numbered(n: usize) -> Dataset {
        Dataset::from_values("n", (0..n).map(|i| json!({ "id": i })).collect()).unwrap()
    }

    fn ids(ds: &Dataset) -> Vec<u64> {
        ds.iter().map(|r| r["id"].as_u64().unwrap()).collect()
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = numbered(200);
        let a = ds.train_test_split(EVAL_FRACTION, SPLIT_SEED).unwrap();
        let b = ds.train_test_split(EVAL_FRACTION, SPLIT_SEED).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 10);
        assert_eq!(a.train.len(), 190);
    }

    #[test]
    fn test_different_seed_changes_partition() {
        let ds = numbered(200);
        let a = ds.train_test_split(EVAL_FRACTION, SPLIT_SEED).unwrap();
        let b = ds.train_test_split(EVAL_FRACTION, 7).unwrap();
        assert_ne!(ids(&a.test), ids(&b.test));
    }

    #[test]
    fn test_test_size_rounds_up() {
        let split = numbered(21).train_test_split(0.05, 1).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 19);
    }

    #[test]
    fn test_invalid_splits() {
        assert!(numbered(1).train_test_split(0.05, 1).is_err());
        assert!(numbered(10).train_test_split(0.0, 1).is_err());
        assert!(numbered(10).train_test_split(1.0, 1).is_err());
    }

    #[test]
    fn test_run_split_without_eval_keeps_everything() {
        let ds = numbered(30);
        let split = split_for_run(ds.clone(), false).unwrap();
        assert!(split.eval.is_none());
        assert_eq!(split.train, ds);
    }

    #[test]
    fn test_run_split_with_eval() {
        let split = split_for_run(numbered(40), true).unwrap();
        assert_eq!(split.eval.as_ref().map(Dataset::len), Some(2));
        assert_eq!(split.train.len(), 38);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = split_for_run(Dataset::new("e", Vec::new()), false).unwrap_err();
        assert!(matches!(err, DataError::Empty(_)));
    }

    proptest! {
        #[test]
        fn prop_split_partitions_rows(n in 2usize..300, seed in any::<u64>()) {
            let ds = numbered(n);
            let split = ds.train_test_split(EVAL_FRACTION, seed).unwrap();
            let mut all: Vec<u64> = ids(&split.train);
            all.extend(ids(&split.test));
            all.sort_unstable();
            prop_assert_eq!(all, (0..n as u64).collect::<Vec<_>>());
            prop_assert_eq!(split.test.len(), (EVAL_FRACTION * n as f64).ceil() as usize);
        }
    }
}
