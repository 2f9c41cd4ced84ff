//! Engine context: the single owner of configuration, the active model
//! version and the fusion weights.
//!
//! Callers (CLI, an HTTP layer) hold one [`EngineContext`] and go through it
//! for prediction, training, incremental retraining, explainability and
//! version management. Mutating operations take `&mut self`, so a fusion
//! call never observes a half-updated model or weight set.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use quantsig_core::domain::{Bar, ClassProbabilities, Label};
use quantsig_core::features::{FeatureBuilder, FeatureError};

use crate::config::{ConfigError, EngineConfig};
use crate::fusion::{ConfidenceLevel, Contribution, Failure, FusionEngine, FusionError};
use crate::incremental::{IncrementalError, IncrementalLearner};
use crate::predictor::PredictorInput;
use crate::store::{ModelArtifacts, ModelStore, StoreError};
use crate::training::{
    ensemble_accuracy, predict_all, FoldReport, SkippedSymbol, TrainingError, TrainingPipeline,
    TrainingRequest,
};
use crate::walk_forward::{final_test_split, WalkForwardError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Fusion(#[from] FusionError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Incremental(#[from] IncrementalError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    WalkForward(#[from] WalkForwardError),
    #[error("no model version is active")]
    NoActiveModel,
    #[error("insufficient data: {needed} bars needed, {available} available")]
    InsufficientData { needed: usize, available: usize },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("no labelled test samples for {0}")]
    NoTestSamples(String),
}

// ─── Requests and responses ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub symbol: String,
    pub bars: Vec<Bar>,
    /// Precomputed feature values in schema order; built from `bars` when absent.
    #[serde(default)]
    pub features: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub symbol: String,
    pub signal: Label,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub strength: f64,
    /// Confidence reached `serving.min_confidence`.
    pub actionable: bool,
    pub breakdown: Vec<Contribution>,
    pub failures: Vec<Failure>,
    pub fused: ClassProbabilities,
    pub version: String,
    /// Timestamp of the last bar scored.
    pub timestamp: Option<NaiveDateTime>,
}

/// One entry of a batch prediction, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub symbol: String,
    pub prediction: Option<PredictionResponse>,
    pub error: Option<String>,
}

/// Ensemble accuracy of the active version on a symbol's trailing test range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub symbol: String,
    pub version: String,
    pub accuracy: f64,
    /// Labelled samples in the test range.
    pub samples: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResponse {
    pub status: ResponseStatus,
    pub version_tag: Option<String>,
    pub samples_used: usize,
    pub per_symbol_test_accuracy: BTreeMap<String, f64>,
    pub folds: Vec<FoldReport>,
    pub skipped: Vec<SkippedSymbol>,
    pub error: Option<String>,
}

impl TrainingResponse {
    fn failed(err: &EngineError) -> Self {
        Self {
            status: ResponseStatus::Error,
            version_tag: None,
            samples_used: 0,
            per_symbol_test_accuracy: BTreeMap::new(),
            folds: Vec::new(),
            skipped: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainRequest {
    /// Checked against the active schema (width, finite values) when given.
    #[serde(default)]
    pub features: Option<Vec<f64>>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub version: String,
    pub predictor: String,
    pub ranking: Vec<(String, f64)>,
}

// ─── Context ─────────────────────────────────────────────────────────

struct ActiveModel {
    artifacts: ModelArtifacts,
    /// Builder matching the version's own feature configuration.
    builder: FeatureBuilder,
}

pub struct EngineContext {
    config: EngineConfig,
    builder: FeatureBuilder,
    fusion: FusionEngine,
    store: Box<dyn ModelStore>,
    active: Option<ActiveModel>,
}

impl EngineContext {
    pub fn new(config: EngineConfig, store: Box<dyn ModelStore>) -> Result<Self, EngineError> {
        config.validate()?;
        let builder = FeatureBuilder::new(config.feature_config())?;
        let fusion = FusionEngine::new(config.ensemble.weights.clone());
        Ok(Self {
            config,
            builder,
            fusion,
            store,
            active: None,
        })
    }

    /// [`EngineContext::new`], then activate the newest stored version if any.
    pub fn open(config: EngineConfig, store: Box<dyn ModelStore>) -> Result<Self, EngineError> {
        let mut ctx = Self::new(config, store)?;
        ctx.load_latest()?;
        Ok(ctx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.artifacts.manifest.tag.as_str())
    }

    pub fn active_artifacts(&self) -> Option<&ModelArtifacts> {
        self.active.as_ref().map(|a| &a.artifacts)
    }

    pub fn set_weights(&mut self, raw: BTreeMap<String, f64>) -> Result<(), EngineError> {
        self.fusion.set_weights(raw)?;
        info!(weights = ?self.fusion.weights().as_map(), "ensemble weights updated");
        Ok(())
    }

    pub fn list_versions(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_versions()?)
    }

    /// Activate `tag`; its stored weights replace the current ones.
    pub fn activate_version(&mut self, tag: &str) -> Result<(), EngineError> {
        let artifacts = self.store.load_version(tag)?;
        self.activate(artifacts)
    }

    pub fn load_latest(&mut self) -> Result<Option<String>, EngineError> {
        match self.store.latest_version()? {
            Some(tag) => {
                self.activate_version(&tag)?;
                Ok(Some(tag))
            }
            None => Ok(None),
        }
    }

    fn activate(&mut self, artifacts: ModelArtifacts) -> Result<(), EngineError> {
        let builder = if artifacts.manifest.schema.id() == self.builder.schema().id() {
            FeatureBuilder::new(self.builder.config().clone())?
        } else {
            FeatureBuilder::new(artifacts.manifest.feature_config.clone())?
        };
        self.fusion = FusionEngine::new(artifacts.manifest.weights.clone());
        info!(
            tag = %artifacts.manifest.tag,
            predictors = artifacts.predictors.len(),
            "model version activated"
        );
        self.active = Some(ActiveModel { artifacts, builder });
        Ok(())
    }

    fn require_active(&self) -> Result<&ActiveModel, EngineError> {
        self.active.as_ref().ok_or(EngineError::NoActiveModel)
    }

    // ─── Prediction ──────────────────────────────────────────────────

    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, EngineError> {
        let needed = self.config.serving.min_bars;
        if request.bars.len() < needed {
            return Err(EngineError::InsufficientData {
                needed,
                available: request.bars.len(),
            });
        }
        let active = self.require_active()?;
        let schema = active.builder.schema();
        let vector = match &request.features {
            Some(values) => schema.vector(values.clone())?,
            None => active.builder.latest_vector(&request.bars)?,
        };

        let outcomes = predict_all(&active.artifacts.predictors, PredictorInput::Features(&vector));
        let fused = self.fusion.fuse(&outcomes);
        info!(
            symbol = %request.symbol,
            signal = %fused.signal,
            confidence = fused.confidence,
            failures = fused.details.failures.len(),
            "prediction"
        );

        Ok(PredictionResponse {
            symbol: request.symbol.clone(),
            signal: fused.signal,
            confidence: fused.confidence,
            level: fused.level,
            strength: fused.strength,
            actionable: fused.confidence >= self.config.serving.min_confidence,
            breakdown: fused.details.contributions,
            failures: fused.details.failures,
            fused: fused.details.fused,
            version: active.artifacts.manifest.tag.clone(),
            timestamp: request.bars.last().map(|b| b.timestamp),
        })
    }

    /// Predict every request independently; a failure only affects its
    /// own entry.
    pub fn predict_batch(&self, requests: &[PredictionRequest]) -> Vec<BatchPrediction> {
        requests
            .par_iter()
            .map(|request| match self.predict(request) {
                Ok(prediction) => BatchPrediction {
                    symbol: request.symbol.clone(),
                    prediction: Some(prediction),
                    error: None,
                },
                Err(e) => {
                    warn!(symbol = %request.symbol, error = %e, "batch prediction failed");
                    BatchPrediction {
                        symbol: request.symbol.clone(),
                        prediction: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    // ─── Evaluation ──────────────────────────────────────────────────

    /// Score the active version on the trailing `training.test_fraction`
    /// of the labelled samples built from `bars`.
    pub fn evaluate(&self, symbol: &str, bars: &[Bar]) -> Result<EvaluationResponse, EngineError> {
        let active = self.require_active()?;
        let dataset = active.builder.build_dataset(bars);
        let split = final_test_split(dataset.len(), self.config.training.test_fraction)?;
        let test = dataset.tail(split.test.len());
        let accuracy = ensemble_accuracy(&self.fusion, &active.artifacts.predictors, &test)
            .ok_or_else(|| EngineError::NoTestSamples(symbol.to_string()))?;
        info!(symbol, accuracy, samples = test.len(), "evaluation");

        Ok(EvaluationResponse {
            symbol: symbol.to_string(),
            version: active.artifacts.manifest.tag.clone(),
            accuracy,
            samples: test.len(),
            timestamp: Utc::now(),
        })
    }

    // ─── Training ────────────────────────────────────────────────────

    fn run_training(
        &mut self,
        request: &TrainingRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<TrainingResponse, EngineError> {
        let pipeline = TrainingPipeline::new(
            &self.builder,
            self.config.walk_forward,
            self.config.training.clone(),
            self.fusion.weights().clone(),
        );
        let outcome = pipeline.run(request, cancel)?;
        let tag = self.store.save_version(&outcome.artifacts)?;

        let mut artifacts = outcome.artifacts;
        artifacts.manifest.tag = tag.clone();
        self.activate(artifacts)?;

        Ok(TrainingResponse {
            status: ResponseStatus::Success,
            version_tag: Some(tag),
            samples_used: outcome.report.samples_used,
            per_symbol_test_accuracy: outcome.report.per_symbol_test_accuracy,
            folds: outcome.report.folds,
            skipped: outcome.report.skipped,
            error: None,
        })
    }

    /// Full walk-forward training; on success the new version is stored
    /// and activated. Failures are reported in the response.
    pub fn train(
        &mut self,
        request: &TrainingRequest,
        cancel: Option<&AtomicBool>,
    ) -> TrainingResponse {
        self.run_training(request, cancel).unwrap_or_else(|e| {
            error!(error = %e, "training failed");
            TrainingResponse::failed(&e)
        })
    }

    fn run_retrain(
        &mut self,
        symbols: &[(String, Vec<Bar>)],
        cancel: Option<&AtomicBool>,
    ) -> Result<TrainingResponse, EngineError> {
        let active = self.require_active()?;
        let learner = IncrementalLearner::new(&active.builder, self.config.incremental.clone());
        let options = self.config.train_options();
        let outcome = learner.retrain(&active.artifacts, symbols, &options, cancel)?;
        let tag = self.store.save_version(&outcome.artifacts)?;

        let samples_used = outcome.artifacts.manifest.summary.samples_used;
        let mut artifacts = outcome.artifacts;
        artifacts.manifest.tag = tag.clone();
        self.activate(artifacts)?;

        Ok(TrainingResponse {
            status: ResponseStatus::Success,
            version_tag: Some(tag),
            samples_used,
            per_symbol_test_accuracy: BTreeMap::new(),
            folds: Vec::new(),
            skipped: Vec::new(),
            error: None,
        })
    }

    /// Incremental retrain of the active version on recent bars.
    pub fn retrain(
        &mut self,
        symbols: &[(String, Vec<Bar>)],
        cancel: Option<&AtomicBool>,
    ) -> TrainingResponse {
        self.run_retrain(symbols, cancel).unwrap_or_else(|e| {
            error!(error = %e, "incremental retrain failed");
            TrainingResponse::failed(&e)
        })
    }

    // ─── Explainability ──────────────────────────────────────────────

    /// Ranked feature importance from the first active predictor that
    /// supports attribution.
    pub fn explain(&self, request: &ExplainRequest) -> Result<Explanation, EngineError> {
        let active = self.require_active()?;
        let schema = active.builder.schema();
        if let Some(values) = &request.features {
            schema.vector(values.clone())?;
        }
        let top_n = request.top_n.unwrap_or(self.config.serving.top_n);
        let (predictor, mut ranking) = active
            .artifacts
            .predictors
            .iter()
            .find_map(|p| p.feature_importance().map(|r| (p.name().to_string(), r)))
            .ok_or_else(|| {
                EngineError::Unsupported("no active predictor supports feature attribution".into())
            })?;
        ranking.truncate(top_n);
        Ok(Explanation {
            version: active.artifacts.manifest.tag.clone(),
            predictor,
            ranking,
        })
    }
}
