//! Incremental learning with experience replay.
//!
//! A retrain takes the most recent samples of every symbol, mixes in a
//! random slice of the previous version's training samples and refits each
//! predictor, producing a new model version whose parent is the previous
//! one. Old samples are replayed so the refreshed ensemble keeps what it
//! learned before.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use quantsig_core::domain::Bar;
use quantsig_core::features::{Dataset, FeatureBuilder, FeatureError};
use quantsig_core::rng::RngHierarchy;

use crate::predictor::TrainOptions;
use crate::store::{ModelArtifacts, ModelManifest, PredictorRecord, TrainingSummary, VersionKind};
use crate::training::{first_importance, fit_predictors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    /// Replayed old samples per new sample (default 0.30).
    pub replay_ratio: f64,
    /// Most recent samples taken from each symbol (default 100).
    pub recent_window: usize,
    /// Record a learning curve over growing prefixes (default false).
    pub progressive: bool,
    /// First prefix as a fraction of the data (default 0.5).
    pub initial_fraction: f64,
    /// Prefix growth factor (default 1.1).
    pub growth: f64,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            replay_ratio: 0.30,
            recent_window: 100,
            progressive: false,
            initial_fraction: 0.5,
            growth: 1.1,
        }
    }
}

#[derive(Debug, Error)]
pub enum IncrementalError {
    #[error("feature schema changed since {tag}: expected {expected}, got {actual}")]
    SchemaMismatch {
        tag: String,
        expected: String,
        actual: String,
    },
    #[error("no new labelled samples")]
    NoNewSamples,
    #[error("every predictor failed to retrain")]
    AllPredictorsFailed,
    #[error("retraining cancelled")]
    Cancelled,
    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),
}

/// All of `new`, followed by `floor(len(new) * replay_ratio)` samples of
/// `old` (capped at `len(old)`) drawn without replacement.
pub fn experience_replay<T: Clone>(
    old: &[T],
    new: &[T],
    replay_ratio: f64,
    rng: &mut impl Rng,
) -> Vec<T> {
    let mut mixed = new.to_vec();
    if old.is_empty() || !(replay_ratio.is_finite() && replay_ratio > 0.0) {
        return mixed;
    }
    let n_replay = ((new.len() as f64 * replay_ratio) as usize).min(old.len());
    mixed.extend(sample(rng, old.len(), n_replay).into_iter().map(|i| old[i].clone()));
    mixed
}

/// Prefix lengths for progressive resizing: start at
/// `floor(len * initial_fraction)` and grow by `growth` until `len`.
///
/// Always ends with `len` itself; each step adds at least one sample.
pub fn progressive_batches(len: usize, initial_fraction: f64, growth: f64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut size = ((len as f64 * initial_fraction.clamp(0.0, 1.0)) as usize).max(1);
    let mut sizes = Vec::new();
    while size <= len {
        sizes.push(size);
        size = ((size as f64 * growth) as usize).max(size + 1);
    }
    if sizes.last() != Some(&len) {
        sizes.push(len);
    }
    sizes
}

/// Accuracy on one progressive prefix and on the samples after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveStage {
    pub predictor: String,
    pub samples: usize,
    pub train_accuracy: Option<f64>,
    pub holdout_accuracy: Option<f64>,
}

#[derive(Debug)]
pub struct IncrementalOutcome {
    pub artifacts: ModelArtifacts,
    pub new_samples: usize,
    pub replayed: usize,
    pub stages: Vec<ProgressiveStage>,
}

pub struct IncrementalLearner<'a> {
    builder: &'a FeatureBuilder,
    config: IncrementalConfig,
}

impl<'a> IncrementalLearner<'a> {
    pub fn new(builder: &'a FeatureBuilder, config: IncrementalConfig) -> Self {
        Self { builder, config }
    }

    /// Most recent `recent_window` labelled samples of every symbol, pooled.
    fn recent_samples(&self, symbols: &[(String, Vec<Bar>)]) -> Result<Dataset, FeatureError> {
        let mut pooled = Dataset::new(self.builder.schema().clone());
        for (symbol, bars) in symbols {
            let recent = self.builder.build_dataset(bars).tail(self.config.recent_window);
            info!(symbol = %symbol, samples = recent.len(), "recent samples");
            pooled.extend(recent)?;
        }
        Ok(pooled)
    }

    fn learning_curve(
        &self,
        previous: &ModelArtifacts,
        data: &Dataset,
        options: &TrainOptions,
    ) -> Vec<ProgressiveStage> {
        let sizes =
            progressive_batches(data.len(), self.config.initial_fraction, self.config.growth);
        let mut stages = Vec::new();
        for record in &previous.manifest.predictors {
            for &size in &sizes {
                let prefix = Dataset {
                    schema: data.schema.clone(),
                    samples: data.samples[..size].to_vec(),
                };
                let holdout = Dataset {
                    schema: data.schema.clone(),
                    samples: data.samples[size..].to_vec(),
                };
                let mut predictor = record.kind.create();
                match predictor.train(&prefix, Some(&holdout), options) {
                    Ok(history) => stages.push(ProgressiveStage {
                        predictor: record.name.clone(),
                        samples: size,
                        train_accuracy: history.train_accuracy.last().copied(),
                        holdout_accuracy: history.val_accuracy.last().copied(),
                    }),
                    Err(e) => {
                        warn!(predictor = %record.name, samples = size, error = %e, "progressive stage failed");
                    }
                }
            }
        }
        stages
    }

    /// Refit every predictor of `previous` on recent data plus replayed
    /// samples and return the new version's artifacts.
    pub fn retrain(
        &self,
        previous: &ModelArtifacts,
        symbols: &[(String, Vec<Bar>)],
        options: &TrainOptions,
        cancel: Option<&AtomicBool>,
    ) -> Result<IncrementalOutcome, IncrementalError> {
        let schema = self.builder.schema();
        let expected = &previous.manifest.schema;
        if schema.id() != expected.id() {
            return Err(IncrementalError::SchemaMismatch {
                tag: previous.manifest.tag.clone(),
                expected: expected.id().to_string(),
                actual: schema.id().to_string(),
            });
        }

        let new = self.recent_samples(symbols)?;
        if new.is_empty() {
            return Err(IncrementalError::NoNewSamples);
        }
        let options = &TrainOptions {
            patterns: Some(self.builder.config().patterns.clone()),
            ..options.clone()
        };
        let mut rng = RngHierarchy::new(options.seed).rng_for("replay", &previous.manifest.tag, 0);
        let samples = experience_replay(
            &previous.samples.samples,
            &new.samples,
            self.config.replay_ratio,
            &mut rng,
        );
        let replayed = samples.len() - new.len();
        let combined = Dataset {
            schema: schema.clone(),
            samples,
        };
        info!(
            parent = %previous.manifest.tag,
            new = new.len(),
            replayed,
            "incremental retrain start"
        );

        let stages = if self.config.progressive {
            self.learning_curve(previous, &combined, options)
        } else {
            Vec::new()
        };
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(IncrementalError::Cancelled);
        }

        let kinds: Vec<_> = previous.manifest.predictors.iter().map(|r| r.kind).collect();
        let predictors = fit_predictors(&kinds, &combined, options);
        if predictors.is_empty() {
            return Err(IncrementalError::AllPredictorsFailed);
        }

        let manifest = ModelManifest {
            tag: String::new(),
            created_at: Utc::now(),
            kind: VersionKind::Incremental,
            parent: Some(previous.manifest.tag.clone()),
            predictors: predictors
                .iter()
                .map(|p| PredictorRecord {
                    name: p.name().to_string(),
                    kind: p.kind(),
                })
                .collect(),
            weights: previous.manifest.weights.clone(),
            schema: schema.clone(),
            feature_config: self.builder.config().clone(),
            feature_importance: first_importance(&predictors),
            summary: TrainingSummary {
                symbols: symbols.iter().map(|(s, _)| s.clone()).collect(),
                samples_used: combined.len(),
                epochs: options.epochs,
                replayed,
                ..TrainingSummary::default()
            },
        };

        Ok(IncrementalOutcome {
            new_samples: new.len(),
            replayed,
            stages,
            artifacts: ModelArtifacts {
                manifest,
                predictors,
                samples: combined,
            },
        })
    }
}
