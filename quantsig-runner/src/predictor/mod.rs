//! Predictors: pluggable models behind one capability set.
//!
//! Every model (rule-based or learned) implements [`Predictor`]: train,
//! evaluate, predict, save, load and optional feature attribution. Training
//! orchestration and ensemble fusion only ever hold `Box<dyn Predictor>`; the
//! concrete type is chosen once through [`PredictorKind`].
//!
//! # Architecture invariant
//! A predictor is trained under one [`FeatureSchema`] and refuses vectors
//! tagged with any other schema id (`SchemaMismatch`). It never sees bars or
//! labels beyond the dataset it is handed.

pub mod boosted_stumps;
pub mod pattern;
pub mod softmax;

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantsig_core::domain::{Bar, ClassProbabilities, Label};
use quantsig_core::features::{Dataset, FeatureError, FeatureSchema, FeatureVector};
use quantsig_core::patterns::PatternConfig;

pub use boosted_stumps::StumpBoostPredictor;
pub use pattern::PatternPredictor;
pub use softmax::SoftmaxPredictor;

/// File each predictor writes inside its own directory.
pub const MODEL_FILE: &str = "model.json";

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("feature schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },
    #[error("predictor {0} is not trained")]
    NotTrained(String),
    #[error("insufficient data: {needed} samples needed, {available} available")]
    InsufficientData { needed: usize, available: usize },
    #[error("predictor {predictor} does not accept {input} input")]
    UnsupportedInput {
        predictor: String,
        input: &'static str,
    },
    #[error("training failed: {0}")]
    Training(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<FeatureError> for PredictorError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::SchemaMismatch { expected, actual } => {
                PredictorError::SchemaMismatch { expected, actual }
            }
            FeatureError::InsufficientData { needed, available } => {
                PredictorError::InsufficientData { needed, available }
            }
            other => PredictorError::Training(other.to_string()),
        }
    }
}

// ─── Inputs and outputs ──────────────────────────────────────────────

/// What a predictor is asked to score: a feature vector or a raw bar window.
#[derive(Debug, Clone, Copy)]
pub enum PredictorInput<'a> {
    Features(&'a FeatureVector),
    Window(&'a [Bar]),
}

impl PredictorInput<'_> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PredictorInput::Features(_) => "feature-vector",
            PredictorInput::Window(_) => "bar-window",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictorOutput {
    pub probabilities: ClassProbabilities,
    /// In [0, 1] when the predictor reports one.
    pub confidence: Option<f64>,
}

impl PredictorOutput {
    /// Output whose confidence is its highest class probability.
    pub fn from_probabilities(probabilities: ClassProbabilities) -> Self {
        Self {
            probabilities,
            confidence: Some(probabilities.max()),
        }
    }
}

/// Result of one predictor call as seen by fusion: never an exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictorOutcome {
    Success(PredictorOutput),
    Failed { reason: String },
}

impl PredictorOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        PredictorOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn output(&self) -> Option<&PredictorOutput> {
        match self {
            PredictorOutcome::Success(output) => Some(output),
            PredictorOutcome::Failed { .. } => None,
        }
    }
}

impl From<Result<PredictorOutput, PredictorError>> for PredictorOutcome {
    fn from(result: Result<PredictorOutput, PredictorError>) -> Self {
        match result {
            Ok(output) => PredictorOutcome::Success(output),
            Err(err) => PredictorOutcome::failed(err),
        }
    }
}

/// Loss (mean cross-entropy) and accuracy on a labelled dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

// ─── Training contract ───────────────────────────────────────────────

/// Options handed to [`Predictor::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Epochs (or boosting rounds) budget (default 50).
    pub epochs: usize,
    /// Early-stopping patience on validation loss (default 15).
    pub patience: usize,
    /// Advisory class weights over [SELL, HOLD, BUY], e.g. from the regime.
    /// Predictors combine them with their own imbalance handling.
    pub class_weights: Option<[f64; 3]>,
    /// Fraction of samples pair-swapped before training (default 0.10).
    pub shuffle_ratio: f64,
    pub seed: u64,
    /// Pattern thresholds the features were built with; kept by the
    /// pattern predictor for raw-window input.
    #[serde(default)]
    pub patterns: Option<PatternConfig>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            patience: 15,
            class_weights: None,
            shuffle_ratio: 0.10,
            seed: 42,
            patterns: None,
        }
    }
}

/// Per-epoch metrics recorded by [`Predictor::train`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.train_loss.len()
    }

    pub(crate) fn push_train(&mut self, eval: Evaluation) {
        self.train_loss.push(eval.loss);
        self.train_accuracy.push(eval.accuracy);
    }

    pub(crate) fn push_val(&mut self, eval: Evaluation) {
        self.val_loss.push(eval.loss);
        self.val_accuracy.push(eval.accuracy);
    }
}

/// Capability set shared by every model.
pub trait Predictor: Send + Sync {
    /// Stable name used as the ensemble weight key and store directory.
    fn name(&self) -> &str;

    fn kind(&self) -> PredictorKind;

    /// Fit on `train`, reporting per-epoch metrics. `validation` drives early
    /// stopping when present.
    fn train(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory, PredictorError>;

    fn predict(&self, input: PredictorInput<'_>) -> Result<PredictorOutput, PredictorError>;

    /// Cross-entropy and accuracy of `predict` over `dataset`.
    fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation, PredictorError> {
        let mut loss = 0.0;
        let mut correct = 0;
        for sample in &dataset.samples {
            let vector = FeatureVector::new(&dataset.schema, sample.features.clone());
            let output = self.predict(PredictorInput::Features(&vector))?;
            loss += cross_entropy(&output.probabilities, sample.label);
            if output.probabilities.argmax() == sample.label {
                correct += 1;
            }
        }
        Ok(evaluation(loss, correct, dataset.len()))
    }

    fn save(&self, dir: &Path) -> Result<(), PredictorError>;

    fn load(&mut self, dir: &Path) -> Result<(), PredictorError>;

    /// Ranked `(feature, score)` pairs, when the model supports attribution.
    fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        None
    }
}

// ─── Factory ─────────────────────────────────────────────────────────

/// Tagged factory for the built-in predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    Pattern,
    Softmax,
    StumpBoost,
}

impl PredictorKind {
    pub const ALL: [PredictorKind; 3] = [
        PredictorKind::Pattern,
        PredictorKind::Softmax,
        PredictorKind::StumpBoost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PredictorKind::Pattern => "pattern",
            PredictorKind::Softmax => "softmax",
            PredictorKind::StumpBoost => "stump_boost",
        }
    }

    pub fn from_name(name: &str) -> Option<PredictorKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Fresh, untrained instance.
    pub fn create(self) -> Box<dyn Predictor> {
        match self {
            PredictorKind::Pattern => Box::new(PatternPredictor::default()),
            PredictorKind::Softmax => Box::new(SoftmaxPredictor::default()),
            PredictorKind::StumpBoost => Box::new(StumpBoostPredictor::default()),
        }
    }
}

impl fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Shared helpers ──────────────────────────────────────────────────

pub(crate) fn cross_entropy(p: &ClassProbabilities, label: Label) -> f64 {
    -p.get(label).max(1e-12).ln()
}

pub(crate) fn evaluation(loss_sum: f64, correct: usize, samples: usize) -> Evaluation {
    if samples == 0 {
        return Evaluation {
            loss: f64::NAN,
            accuracy: f64::NAN,
            samples: 0,
        };
    }
    Evaluation {
        loss: loss_sum / samples as f64,
        accuracy: correct as f64 / samples as f64,
        samples,
    }
}

/// Numerically stable softmax over three scores.
pub(crate) fn softmax3(scores: [f64; 3]) -> ClassProbabilities {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.map(|s| (s - max).exp());
    ClassProbabilities::from_scores(exp)
}

/// Inverse-frequency class weights, scaled by the advisory weights if given.
///
/// Classes absent from the data get weight 0.
pub(crate) fn sample_class_weights(dataset: &Dataset, advisory: Option<[f64; 3]>) -> [f64; 3] {
    let counts = dataset.class_counts();
    let total = dataset.len() as f64;
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let mut weights = [0.0; 3];
    for (i, &count) in counts.iter().enumerate() {
        if count > 0 {
            weights[i] = total / (present * count as f64);
        }
    }
    if let Some(advisory) = advisory {
        for (w, a) in weights.iter_mut().zip(advisory) {
            *w *= a.max(0.0);
        }
    }
    weights
}

pub(crate) fn check_schema(
    schema: Option<&FeatureSchema>,
    name: &str,
    vector: &FeatureVector,
) -> Result<(), PredictorError> {
    let schema = schema.ok_or_else(|| PredictorError::NotTrained(name.to_string()))?;
    schema.check(vector)?;
    Ok(())
}

pub(crate) fn write_model<T: Serialize>(dir: &Path, model: &T) -> Result<(), PredictorError> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(model)?;
    fs::write(dir.join(MODEL_FILE), json)?;
    Ok(())
}

pub(crate) fn read_model<T: DeserializeOwned>(dir: &Path) -> Result<T, PredictorError> {
    let json = fs::read_to_string(dir.join(MODEL_FILE))?;
    Ok(serde_json::from_str(&json)?)
}
