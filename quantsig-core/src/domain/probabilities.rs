//! Class probability vectors over `[SELL, HOLD, BUY]`.

use serde::{Deserialize, Serialize};

use super::label::Label;

/// Vector emitted when no predictor contributes.
pub const NO_SIGNAL: [f64; 3] = [0.33, 0.34, 0.33];

/// Probability vector of length 3, indexed by [`Label::index`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities(pub [f64; 3]);

impl ClassProbabilities {
    /// Normalise raw non-negative scores to sum to 1.
    ///
    /// Negative or non-finite entries are treated as zero; an all-zero input
    /// yields [`NO_SIGNAL`].
    pub fn from_scores(scores: [f64; 3]) -> Self {
        let cleaned = scores.map(|s| if s.is_finite() && s > 0.0 { s } else { 0.0 });
        let total: f64 = cleaned.iter().sum();
        if total <= 0.0 {
            return Self::no_signal();
        }
        Self(cleaned.map(|s| s / total))
    }

    pub fn no_signal() -> Self {
        Self(NO_SIGNAL)
    }

    pub fn uniform() -> Self {
        Self([1.0 / 3.0; 3])
    }

    pub fn get(&self, label: Label) -> f64 {
        self.0[label.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Highest-probability class; ties resolve to the lowest index.
    pub fn argmax(&self) -> Label {
        let mut best = 0;
        for i in 1..3 {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        Label::ALL[best]
    }

    pub fn max(&self) -> f64 {
        self.0[self.argmax().index()]
    }
}
