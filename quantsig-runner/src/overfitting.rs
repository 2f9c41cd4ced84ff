//! Anti-overfitting monitor.
//!
//! - `detect_overfitting`: mean of the last 10 train vs. validation metric
//!   values (higher is better); a gap above `threshold` flags the fold.
//! - `should_stop_early`: the latest validation loss is the worst of the
//!   trailing `patience` window.
//! - `augment_temporal`: swaps a small number of random sample pairs on a
//!   copy of the data, leaving most of the temporal order intact.
//!
//! [`FoldGate`] collects one verdict per walk-forward fold.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Trailing window used by [`detect_overfitting`].
pub const OVERFIT_WINDOW: usize = 10;

/// Default train/validation gap that counts as overfitting.
pub const DEFAULT_OVERFIT_THRESHOLD: f64 = 0.10;

/// Default early-stopping patience.
pub const DEFAULT_PATIENCE: usize = 15;

fn tail_mean(values: &[f64], window: usize) -> f64 {
    let tail = &values[values.len() - window..];
    tail.iter().sum::<f64>() / window as f64
}

/// True when the train metric beats the validation metric by more than
/// `threshold`, averaged over the last [`OVERFIT_WINDOW`] observations.
///
/// Returns false while either history is shorter than the window.
pub fn detect_overfitting(train_history: &[f64], val_history: &[f64], threshold: f64) -> bool {
    if train_history.len() < OVERFIT_WINDOW || val_history.len() < OVERFIT_WINDOW {
        return false;
    }
    let gap = tail_mean(train_history, OVERFIT_WINDOW) - tail_mean(val_history, OVERFIT_WINDOW);
    gap > threshold
}

/// True once the most recent loss equals the maximum of the trailing
/// `patience` values.
pub fn should_stop_early(val_loss_history: &[f64], patience: usize) -> bool {
    if patience == 0 || val_loss_history.len() < patience {
        return false;
    }
    let window = &val_loss_history[val_loss_history.len() - patience..];
    let Some(&latest) = window.last() else {
        return false;
    };
    let worst = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    latest >= worst
}

/// Copy `features` and `labels`, draw `floor(len * shuffle_ratio)` distinct
/// positions and swap them in consecutive pairs in both copies alike.
///
/// At most `floor(len * shuffle_ratio)` samples leave their place; an odd
/// draw leaves the last position untouched.
pub fn augment_temporal<T: Clone, L: Clone>(
    features: &[T],
    labels: &[L],
    shuffle_ratio: f64,
    rng: &mut impl Rng,
) -> (Vec<T>, Vec<L>) {
    let mut x = features.to_vec();
    let mut y = labels.to_vec();
    let n = x.len().min(y.len());
    if n < 2 || shuffle_ratio.is_nan() || shuffle_ratio <= 0.0 {
        return (x, y);
    }

    let picks = (n as f64 * shuffle_ratio.min(1.0)).floor() as usize;
    let positions = index::sample(rng, n, picks).into_vec();
    for pair in positions.chunks_exact(2) {
        x.swap(pair[0], pair[1]);
        y.swap(pair[0], pair[1]);
    }
    (x, y)
}

// ─── Fold gate ───────────────────────────────────────────────────────

fn last_finite(values: &[f64]) -> Option<f64> {
    values.last().copied().filter(|v| v.is_finite())
}

/// Overfitting verdict for one predictor on one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldVerdict {
    pub fold: usize,
    pub predictor: String,
    /// Final-epoch accuracies; `None` when not measured.
    pub train_accuracy: Option<f64>,
    pub validation_accuracy: Option<f64>,
    pub overfit: bool,
    pub stopped_early: bool,
}

/// Per-fold verdicts collected during a walk-forward run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldGate {
    pub threshold: f64,
    pub verdicts: Vec<FoldVerdict>,
}

impl FoldGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            verdicts: Vec::new(),
        }
    }

    /// Judge one training history and record the verdict.
    pub fn record(
        &mut self,
        fold: usize,
        predictor: &str,
        train_accuracy: &[f64],
        val_accuracy: &[f64],
        stopped_early: bool,
    ) -> &FoldVerdict {
        let overfit = detect_overfitting(train_accuracy, val_accuracy, self.threshold);
        self.verdicts.push(FoldVerdict {
            fold,
            predictor: predictor.to_string(),
            train_accuracy: last_finite(train_accuracy),
            validation_accuracy: last_finite(val_accuracy),
            overfit,
            stopped_early,
        });
        &self.verdicts[self.verdicts.len() - 1]
    }

    pub fn overfit_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.overfit).count()
    }

    pub fn merge(&mut self, other: FoldGate) {
        self.verdicts.extend(other.verdicts);
    }
}
