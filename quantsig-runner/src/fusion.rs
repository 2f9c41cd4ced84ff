//! Ensemble fusion: weighted average of predictor probability vectors.
//!
//! Only successful outcomes contribute `weight × probabilities`; failed or
//! absent predictors contribute nothing and never abort fusion. The sum is
//! divided by the accumulated weight. With no accumulated weight the fused
//! vector is the no-signal vector `[0.33, 0.34, 0.33]`.
//!
//! signal = argmax (lowest class index wins ties), confidence = max.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use quantsig_core::domain::{ClassProbabilities, Label};

use crate::predictor::PredictorOutcome;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("invalid weight for {predictor}: {weight}")]
    InvalidWeight { predictor: String, weight: f64 },
    #[error("ensemble weights sum to zero")]
    ZeroTotalWeight,
}

// ─── Weights ─────────────────────────────────────────────────────────

/// Predictor name → non-negative weight, normalised to sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct EnsembleWeights(BTreeMap<String, f64>);

impl EnsembleWeights {
    pub fn new(raw: BTreeMap<String, f64>) -> Result<Self, FusionError> {
        for (name, &w) in &raw {
            if !w.is_finite() || w < 0.0 {
                return Err(FusionError::InvalidWeight {
                    predictor: name.clone(),
                    weight: w,
                });
            }
        }
        let total: f64 = raw.values().sum();
        if total <= 0.0 {
            return Err(FusionError::ZeroTotalWeight);
        }
        Ok(Self(raw.into_iter().map(|(k, w)| (k, w / total)).collect()))
    }

    /// Weight for `name`; 0 for unknown predictors.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &w)| (k.as_str(), w))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("pattern".to_string(), 0.25),
            ("softmax".to_string(), 0.35),
            ("stump_boost".to_string(), 0.40),
        ]))
    }
}

impl TryFrom<BTreeMap<String, f64>> for EnsembleWeights {
    type Error = FusionError;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<EnsembleWeights> for BTreeMap<String, f64> {
    fn from(weights: EnsembleWeights) -> Self {
        weights.0
    }
}

// ─── Fused signal ────────────────────────────────────────────────────

/// Qualitative bucket for the fused confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Weak,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub const HIGH: f64 = 0.75;
    pub const MEDIUM: f64 = 0.60;
    pub const LOW: f64 = 0.50;

    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= Self::HIGH {
            ConfidenceLevel::High
        } else if confidence >= Self::MEDIUM {
            ConfidenceLevel::Medium
        } else if confidence >= Self::LOW {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Weak
        }
    }

    fn magnitude(self) -> f64 {
        match self {
            ConfidenceLevel::High => 2.0,
            ConfidenceLevel::Medium => 1.0,
            ConfidenceLevel::Low => 0.5,
            ConfidenceLevel::Weak => 0.0,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::Weak => "weak",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Signed strength: positive for BUY, negative for SELL, 0 for HOLD.
pub fn signal_strength(signal: Label, level: ConfidenceLevel) -> f64 {
    match signal {
        Label::Buy => level.magnitude(),
        Label::Sell => -level.magnitude(),
        Label::Hold => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub predictor: String,
    pub weight: f64,
    pub probabilities: ClassProbabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub predictor: String,
    pub reason: String,
}

/// Audit trail of one fusion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionDetails {
    pub contributions: Vec<Contribution>,
    pub failures: Vec<Failure>,
    /// Weighted predictors with no outcome at all.
    pub missing: Vec<String>,
    pub fused: ClassProbabilities,
    pub total_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSignal {
    pub signal: Label,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub strength: f64,
    pub details: FusionDetails,
}

// ─── Engine ──────────────────────────────────────────────────────────

/// Holds the ensemble weights. Weights change only through `&mut self`, so a
/// fusion call always sees one consistent set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionEngine {
    weights: EnsembleWeights,
}

impl FusionEngine {
    pub fn new(weights: EnsembleWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// Replace the weights after renormalising them.
    pub fn set_weights(&mut self, raw: BTreeMap<String, f64>) -> Result<(), FusionError> {
        self.weights = EnsembleWeights::new(raw)?;
        Ok(())
    }

    pub fn fuse(&self, outcomes: &BTreeMap<String, PredictorOutcome>) -> FusedSignal {
        let mut sums = [0.0; 3];
        let mut total_weight = 0.0;
        let mut contributions = Vec::new();
        let mut failures = Vec::new();

        for (name, outcome) in outcomes {
            match outcome {
                PredictorOutcome::Success(output) => {
                    let weight = self.weights.get(name);
                    for (s, p) in sums.iter_mut().zip(output.probabilities.0) {
                        *s += weight * p;
                    }
                    total_weight += weight;
                    contributions.push(Contribution {
                        predictor: name.clone(),
                        weight,
                        probabilities: output.probabilities,
                    });
                }
                PredictorOutcome::Failed { reason } => {
                    warn!(predictor = %name, %reason, "predictor failed, excluded from fusion");
                    failures.push(Failure {
                        predictor: name.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        let missing = self
            .weights
            .names()
            .filter(|name| !outcomes.contains_key(*name))
            .map(str::to_string)
            .collect();

        let fused = if total_weight > 0.0 {
            ClassProbabilities(sums.map(|s| s / total_weight))
        } else {
            ClassProbabilities::no_signal()
        };
        let signal = fused.argmax();
        let confidence = fused.max();
        let level = ConfidenceLevel::from_confidence(confidence);
        debug!(%signal, confidence, total_weight, "fused ensemble output");

        FusedSignal {
            signal,
            confidence,
            level,
            strength: signal_strength(signal, level),
            details: FusionDetails {
                contributions,
                failures,
                missing,
                fused,
                total_weight,
            },
        }
    }
}
