//! Walk-forward validation: expanding-window fold generation.
//!
//! Splits a time-ordered series into folds whose training range always starts
//! at bar 0 and grows by `step_size` per fold, with a fixed-size validation
//! range immediately after it:
//! - Fold 0: train = [0 .. initial), validation = [initial .. initial + val)
//! - Fold k: train = [0 .. initial + k·step), validation = next `val` bars
//!
//! A fold is emitted only while its validation range fits inside the series,
//! so the fold count is `floor((n - initial - val) / step) + 1` whenever
//! `n >= initial + val`.
//!
//! A trailing test range is reserved by [`final_test_split`] and never takes
//! part in fold generation.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantsig_core::features::Dataset;

// ─── Configuration ───────────────────────────────────────────────────

/// Fold geometry, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Bars in the first training range (default 500).
    pub initial_train_size: usize,
    /// Bars in every validation range (default 100).
    pub validation_size: usize,
    /// Bars added to the training range per fold (default 50).
    pub step_size: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            initial_train_size: 500,
            validation_size: 100,
            step_size: 50,
        }
    }
}

impl WalkForwardConfig {
    /// Folds over a series of `n` bars.
    pub fn split(&self, n: usize) -> Result<Vec<Fold>, WalkForwardError> {
        split(n, self.initial_train_size, self.validation_size, self.step_size)
    }

    /// Bars needed for at least one fold.
    pub fn min_bars(&self) -> usize {
        self.initial_train_size + self.validation_size
    }
}

// ─── Folds ───────────────────────────────────────────────────────────

/// One train/validation pair of half-open bar-index ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

impl Fold {
    /// Training range with the last `lookahead` bars removed.
    ///
    /// A sample at bar `i` is labelled from the close at `i + lookahead`;
    /// dropping the tail keeps every label horizon out of validation.
    pub fn purged_train(&self, lookahead: usize) -> Range<usize> {
        let end = self.train.end.saturating_sub(lookahead).max(self.train.start);
        self.train.start..end
    }

    /// Split a dataset into this fold's (purged) training and validation samples.
    pub fn partition(&self, dataset: &Dataset, lookahead: usize) -> (Dataset, Dataset) {
        (
            dataset.within(self.purged_train(lookahead)),
            dataset.within(self.validation.clone()),
        )
    }
}

/// Development range used for folds plus the reserved trailing test range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSplit {
    pub development: Range<usize>,
    pub test: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkForwardError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("insufficient data: {total_bars} bars < minimum {min_bars}")]
    InsufficientData { total_bars: usize, min_bars: usize },
}

fn positive(name: &'static str, value: usize) -> Result<(), WalkForwardError> {
    if value == 0 {
        return Err(WalkForwardError::InvalidParameter {
            name,
            reason: "must be positive".into(),
        });
    }
    Ok(())
}

/// Expanding-window folds over `n` bars.
///
/// Returns an empty list when the series is shorter than
/// `initial_train_size + validation_size`.
pub fn split(
    n: usize,
    initial_train_size: usize,
    validation_size: usize,
    step_size: usize,
) -> Result<Vec<Fold>, WalkForwardError> {
    positive("initial_train_size", initial_train_size)?;
    positive("validation_size", validation_size)?;
    positive("step_size", step_size)?;

    let mut folds = Vec::new();
    let mut train_end = initial_train_size;
    // `<=` keeps the fold count at (n - initial - validation) / step + 1;
    // a validation range may end exactly on the last bar.
    while train_end + validation_size <= n {
        folds.push(Fold {
            index: folds.len(),
            train: 0..train_end,
            validation: train_end..train_end + validation_size,
        });
        train_end += step_size;
    }
    Ok(folds)
}

/// Reserve the trailing `floor(n * test_fraction)` bars as a test range.
pub fn final_test_split(n: usize, test_fraction: f64) -> Result<TestSplit, WalkForwardError> {
    if !test_fraction.is_finite() || !(0.0..1.0).contains(&test_fraction) {
        return Err(WalkForwardError::InvalidParameter {
            name: "test_fraction",
            reason: format!("must be in [0, 1), got {test_fraction}"),
        });
    }
    let test_len = (n as f64 * test_fraction).floor() as usize;
    let boundary = n - test_len;
    Ok(TestSplit {
        development: 0..boundary,
        test: boundary..n,
    })
}

/// Folds over the development range of a series of `n` bars.
///
/// Errors with `InsufficientData` when not even one fold fits.
pub fn plan_folds(
    n: usize,
    test_fraction: f64,
    config: &WalkForwardConfig,
) -> Result<(TestSplit, Vec<Fold>), WalkForwardError> {
    let test_split = final_test_split(n, test_fraction)?;
    let folds = config.split(test_split.development.end)?;
    if folds.is_empty() {
        return Err(WalkForwardError::InsufficientData {
            total_bars: test_split.development.end,
            min_bars: config.min_bars(),
        });
    }
    Ok((test_split, folds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fold_geometry() {
        let folds = split(1000, 500, 100, 50).unwrap();
        assert_eq!(folds[0].train, 0..500);
        assert_eq!(folds[0].validation, 500..600);
        assert_eq!(folds[1].train, 0..550);
        assert_eq!(folds[1].validation, 550..650);
    }

    #[test]
    fn fold_count_matches_formula() {
        for (n, init, val, step) in [(300, 200, 50, 25), (1000, 500, 100, 50), (651, 500, 100, 50)] {
            let folds = split(n, init, val, step).unwrap();
            assert_eq!(folds.len(), (n - init - val) / step + 1, "n={n}");
        }
    }

    #[test]
    fn last_validation_may_end_at_series_end() {
        let folds = split(300, 200, 50, 25).unwrap();
        assert_eq!(folds.last().unwrap().validation.end, 300);

        // Exactly initial + validation bars still yields one fold.
        let folds = split(250, 200, 50, 25).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].validation, 200..250);
    }

    #[test]
    fn short_series_yields_no_folds() {
        assert!(split(120, 100, 50, 10).unwrap().is_empty());
    }

    #[test]
    fn zero_sizes_rejected() {
        assert!(matches!(
            split(100, 0, 10, 10),
            Err(WalkForwardError::InvalidParameter { name: "initial_train_size", .. })
        ));
        assert!(split(100, 10, 0, 10).is_err());
        assert!(split(100, 10, 10, 0).is_err());
    }

    #[test]
    fn test_split_reserves_tail() {
        let s = final_test_split(1000, 0.2).unwrap();
        assert_eq!(s.development, 0..800);
        assert_eq!(s.test, 800..1000);

        let s = final_test_split(10, 0.25).unwrap();
        assert_eq!(s.test, 8..10);
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(final_test_split(100, 1.0).is_err());
        assert!(final_test_split(100, -0.1).is_err());
        assert!(final_test_split(100, f64::NAN).is_err());
        assert_eq!(final_test_split(100, 0.0).unwrap().test, 100..100);
    }

    #[test]
    fn planned_folds_stay_in_development() {
        let config = WalkForwardConfig::default();
        let (test_split, folds) = plan_folds(1000, 0.2, &config).unwrap();
        for fold in &folds {
            assert!(fold.validation.end <= test_split.test.start);
        }
        assert_eq!(folds.len(), 5);
    }

    #[test]
    fn plan_without_room_is_insufficient() {
        let err = plan_folds(500, 0.2, &WalkForwardConfig::default()).unwrap_err();
        assert_eq!(
            err,
            WalkForwardError::InsufficientData {
                total_bars: 400,
                min_bars: 600
            }
        );
    }

    #[test]
    fn purge_removes_label_horizon() {
        let fold = Fold {
            index: 0,
            train: 0..100,
            validation: 100..120,
        };
        assert_eq!(fold.purged_train(5), 0..95);
        assert_eq!(fold.purged_train(500), 0..0);
    }
}
