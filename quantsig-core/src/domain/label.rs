//! Three-class trading label and the forward-return rule that produces it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading decision class. The discriminant is the class index used by
/// probability vectors: `SELL=0, HOLD=1, BUY=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Sell = 0,
    Hold = 1,
    Buy = 2,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Sell, Label::Hold, Label::Buy];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Label> {
        Self::ALL.get(index).copied()
    }

    /// Label from a fractional forward return: above `+threshold` is BUY,
    /// below `-threshold` is SELL, anything else HOLD.
    pub fn from_return(forward_return: f64, threshold: f64) -> Label {
        if forward_return > threshold {
            Label::Buy
        } else if forward_return < -threshold {
            Label::Sell
        } else {
            Label::Hold
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Sell => "SELL",
            Label::Hold => "HOLD",
            Label::Buy => "BUY",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward labels for a close series.
///
/// Entry `i` is the label of the percentage change from `closes[i]` to
/// `closes[i + lookahead]`; the last `lookahead` entries are `None`.
pub fn forward_labels(closes: &[f64], lookahead: usize, threshold: f64) -> Vec<Option<Label>> {
    (0..closes.len())
        .map(|i| {
            let future = closes.get(i + lookahead)?;
            let current = closes[i];
            if lookahead == 0 || current == 0.0 || current.is_nan() || future.is_nan() {
                return None;
            }
            Some(Label::from_return((future - current) / current, threshold))
        })
        .collect()
}
