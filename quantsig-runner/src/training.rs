//! Training orchestration: per-symbol walk-forward, then a pooled final fit.
//!
//! For each symbol (in parallel on a rayon pool):
//! 1. Skip when the series is shorter than `min_data_points`
//! 2. Build the labelled dataset and reserve the trailing test range
//! 3. Plan expanding-window folds over the development range
//! 4. Train every predictor kind on each fold's purged training range and
//!    record an overfitting verdict against its validation range
//!
//! The final predictors are trained on the pooled development samples and
//! the fused ensemble is scored on each symbol's untouched test range.
//!
//! Cancellation is checked before every fold and before the final fit;
//! a fold that has started always finishes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use quantsig_core::domain::Bar;
use quantsig_core::features::{Dataset, FeatureBuilder, FeatureError, FeatureVector};
use quantsig_core::regime::{detect_regime, regime_class_weights, simple_returns, Regime};
use quantsig_core::rng::RngHierarchy;

use crate::fusion::{EnsembleWeights, FusionEngine};
use crate::overfitting::{FoldGate, DEFAULT_OVERFIT_THRESHOLD, DEFAULT_PATIENCE};
use crate::predictor::{
    Predictor, PredictorInput, PredictorKind, PredictorOutcome, TrainOptions,
};
use crate::store::{ModelArtifacts, ModelManifest, PredictorRecord, TrainingSummary, VersionKind};
use crate::walk_forward::{plan_folds, Fold, WalkForwardConfig, WalkForwardError};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Epoch budget per predictor (default 50).
    pub epochs: usize,
    /// Trailing fraction of each series held out for testing (default 0.2).
    pub test_fraction: f64,
    /// Symbols with fewer bars are skipped (default 200).
    pub min_data_points: usize,
    /// Pair-swap ratio for temporal augmentation (default 0.10).
    pub shuffle_ratio: f64,
    /// Train/validation accuracy gap flagged as overfitting (default 0.10).
    pub overfitting_threshold: f64,
    /// Early-stopping patience (default 15).
    pub patience: usize,
    /// Returns inspected by the regime detector (default 60).
    pub regime_lookback: usize,
    pub seed: u64,
    /// Worker threads; 0 uses the rayon default.
    pub threads: usize,
    pub predictors: Vec<PredictorKind>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            test_fraction: 0.2,
            min_data_points: 200,
            shuffle_ratio: 0.10,
            overfitting_threshold: DEFAULT_OVERFIT_THRESHOLD,
            patience: DEFAULT_PATIENCE,
            regime_lookback: 60,
            seed: 42,
            threads: 0,
            predictors: PredictorKind::ALL.to_vec(),
        }
    }
}

// ─── Requests and results ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub symbols: Vec<(String, Vec<Bar>)>,
    /// Overrides `TrainingConfig::epochs` when set.
    pub epochs: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// One predictor trained on one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub symbol: String,
    pub fold: usize,
    pub predictor: String,
    pub train_end: usize,
    pub validation_end: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub epochs_run: usize,
    pub validation_accuracy: Option<f64>,
    pub overfit: bool,
    pub stopped_early: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples_used: usize,
    pub per_symbol_test_accuracy: BTreeMap<String, f64>,
    pub folds: Vec<FoldReport>,
    pub skipped: Vec<SkippedSymbol>,
}

/// Trained artifacts ready for the store, plus the run report.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifacts: ModelArtifacts,
    pub report: TrainingReport,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training cancelled")]
    Cancelled,
    #[error("no usable symbols ({skipped} skipped)")]
    NoUsableSymbols { skipped: usize },
    #[error("every predictor failed in the final fit")]
    AllPredictorsFailed,
    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),
    #[error("walk-forward error: {0}")]
    WalkForward(#[from] WalkForwardError),
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

// ─── Per-symbol walk-forward ─────────────────────────────────────────

struct SymbolRun {
    symbol: String,
    regime: Regime,
    development: Dataset,
    test: Dataset,
    gate: FoldGate,
    folds: Vec<FoldReport>,
}

enum SymbolResult {
    Ran(SymbolRun),
    Skipped(SkippedSymbol),
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Orchestrates one full training run.
pub struct TrainingPipeline<'a> {
    builder: &'a FeatureBuilder,
    walk_forward: WalkForwardConfig,
    config: TrainingConfig,
    weights: EnsembleWeights,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(
        builder: &'a FeatureBuilder,
        walk_forward: WalkForwardConfig,
        config: TrainingConfig,
        weights: EnsembleWeights,
    ) -> Self {
        Self {
            builder,
            walk_forward,
            config,
            weights,
        }
    }

    fn options(&self, epochs: usize, class_weights: [f64; 3], symbol: &str, fold: u64) -> TrainOptions {
        TrainOptions {
            epochs,
            patience: self.config.patience,
            class_weights: Some(class_weights),
            shuffle_ratio: self.config.shuffle_ratio,
            seed: RngHierarchy::new(self.config.seed).sub_seed("train", symbol, fold),
            patterns: Some(self.builder.config().patterns.clone()),
        }
    }

    fn run_fold(
        &self,
        symbol: &str,
        fold: &Fold,
        dataset: &Dataset,
        options: &TrainOptions,
        gate: &mut FoldGate,
    ) -> Vec<FoldReport> {
        let lookahead = self.builder.config().lookahead;
        let (train, validation) = fold.partition(dataset, lookahead);
        let mut reports = Vec::with_capacity(self.config.predictors.len());

        for kind in &self.config.predictors {
            let mut predictor = kind.create();
            let mut report = FoldReport {
                symbol: symbol.to_string(),
                fold: fold.index,
                predictor: predictor.name().to_string(),
                train_end: fold.train.end,
                validation_end: fold.validation.end,
                train_samples: train.len(),
                validation_samples: validation.len(),
                epochs_run: 0,
                validation_accuracy: None,
                overfit: false,
                stopped_early: false,
                error: None,
            };
            match predictor.train(&train, Some(&validation), options) {
                Ok(history) => {
                    let verdict = gate.record(
                        fold.index,
                        predictor.name(),
                        &history.train_accuracy,
                        &history.val_accuracy,
                        history.stopped_early,
                    );
                    report.epochs_run = history.epochs_run();
                    report.validation_accuracy = verdict.validation_accuracy;
                    report.overfit = verdict.overfit;
                    report.stopped_early = verdict.stopped_early;
                    if verdict.overfit {
                        warn!(symbol, fold = fold.index, predictor = predictor.name(), "fold flagged as overfit");
                    }
                }
                Err(e) => {
                    warn!(symbol, fold = fold.index, predictor = predictor.name(), error = %e, "predictor failed on fold");
                    report.error = Some(e.to_string());
                }
            }
            reports.push(report);
        }
        reports
    }

    fn run_symbol(
        &self,
        symbol: &str,
        bars: &[Bar],
        epochs: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<SymbolResult, TrainingError> {
        let skip = |reason: String| -> Result<SymbolResult, TrainingError> {
            info!(symbol, %reason, "skipping symbol");
            Ok(SymbolResult::Skipped(SkippedSymbol {
                symbol: symbol.to_string(),
                reason,
            }))
        };

        if bars.len() < self.config.min_data_points {
            return skip(format!(
                "insufficient data: {} bars < minimum {}",
                bars.len(),
                self.config.min_data_points
            ));
        }
        let (split, folds) = match plan_folds(bars.len(), self.config.test_fraction, &self.walk_forward) {
            Ok(plan) => plan,
            Err(WalkForwardError::InsufficientData { total_bars, min_bars }) => {
                return skip(format!(
                    "insufficient data for walk-forward: {total_bars} development bars < {min_bars}"
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let dataset = self.builder.build_dataset(bars);
        let returns = simple_returns(&bars[split.development.clone()]);
        let regime = detect_regime(&returns, self.config.regime_lookback);
        let class_weights = regime_class_weights(regime);
        info!(symbol, ?regime, folds = folds.len(), samples = dataset.len(), "walk-forward start");

        let mut gate = FoldGate::new(self.config.overfitting_threshold);
        let mut reports = Vec::new();
        for fold in &folds {
            if is_cancelled(cancel) {
                return Err(TrainingError::Cancelled);
            }
            let options = self.options(epochs, class_weights, symbol, fold.index as u64);
            reports.extend(self.run_fold(symbol, fold, &dataset, &options, &mut gate));
        }

        // Development samples whose label horizon reaches into the test range are dropped.
        let lookahead = self.builder.config().lookahead;
        let dev_end = split.development.end.saturating_sub(lookahead);
        Ok(SymbolResult::Ran(SymbolRun {
            symbol: symbol.to_string(),
            regime,
            development: dataset.within(0..dev_end),
            test: dataset.within(split.test.clone()),
            gate,
            folds: reports,
        }))
    }

    fn walk_forward_all(
        &self,
        request: &TrainingRequest,
        epochs: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<SymbolResult>, TrainingError> {
        let work = || {
            request
                .symbols
                .par_iter()
                .map(|(symbol, bars)| self.run_symbol(symbol, bars, epochs, cancel))
                .collect::<Result<Vec<_>, _>>()
        };
        if self.config.threads == 0 {
            return work();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("quantsig-train-{i}"))
            .build()
            .map_err(|e| TrainingError::ThreadPool(e.to_string()))?;
        pool.install(work)
    }

    /// Run walk-forward validation and the final fit.
    pub fn run(
        &self,
        request: &TrainingRequest,
        cancel: Option<&AtomicBool>,
    ) -> Result<TrainingOutcome, TrainingError> {
        let epochs = request.epochs.unwrap_or(self.config.epochs);
        info!(symbols = request.symbols.len(), epochs, "training start");

        let mut runs = Vec::new();
        let mut skipped = Vec::new();
        for result in self.walk_forward_all(request, epochs, cancel)? {
            match result {
                SymbolResult::Ran(run) => runs.push(run),
                SymbolResult::Skipped(s) => skipped.push(s),
            }
        }
        if runs.is_empty() {
            return Err(TrainingError::NoUsableSymbols {
                skipped: skipped.len(),
            });
        }
        if is_cancelled(cancel) {
            return Err(TrainingError::Cancelled);
        }

        let mut pooled = Dataset::new(self.builder.schema().clone());
        let mut gate = FoldGate::new(self.config.overfitting_threshold);
        let mut advisory = [0.0; 3];
        for run in &runs {
            pooled.extend(run.development.clone())?;
            gate.merge(run.gate.clone());
            for (a, w) in advisory.iter_mut().zip(regime_class_weights(run.regime)) {
                *a += w / runs.len() as f64;
            }
        }

        let options = self.options(epochs, advisory, "*", u64::MAX);
        let predictors = fit_predictors(&self.config.predictors, &pooled, &options);
        if predictors.is_empty() {
            return Err(TrainingError::AllPredictorsFailed);
        }

        let fusion = FusionEngine::new(self.weights.clone());
        let per_symbol_test_accuracy = runs
            .iter()
            .filter_map(|run| {
                ensemble_accuracy(&fusion, &predictors, &run.test).map(|acc| (run.symbol.clone(), acc))
            })
            .collect();

        let folds: Vec<FoldReport> = runs.iter().flat_map(|r| r.folds.clone()).collect();
        let fold_count = runs
            .iter()
            .map(|r| r.folds.iter().map(|f| f.fold).collect::<BTreeSet<_>>().len())
            .sum();
        let manifest = ModelManifest {
            tag: String::new(),
            created_at: Utc::now(),
            kind: VersionKind::Full,
            parent: None,
            predictors: predictors
                .iter()
                .map(|p| PredictorRecord {
                    name: p.name().to_string(),
                    kind: p.kind(),
                })
                .collect(),
            weights: self.weights.clone(),
            schema: self.builder.schema().clone(),
            feature_config: self.builder.config().clone(),
            feature_importance: first_importance(&predictors),
            summary: TrainingSummary {
                symbols: runs.iter().map(|r| r.symbol.clone()).collect(),
                samples_used: pooled.len(),
                epochs,
                folds: fold_count,
                overfit_folds: gate.overfit_count(),
                regimes: runs.iter().map(|r| (r.symbol.clone(), r.regime)).collect(),
                verdicts: gate.verdicts,
                replayed: 0,
            },
        };
        info!(
            samples = pooled.len(),
            predictors = predictors.len(),
            skipped = skipped.len(),
            "training complete"
        );

        Ok(TrainingOutcome {
            report: TrainingReport {
                samples_used: pooled.len(),
                per_symbol_test_accuracy,
                folds,
                skipped,
            },
            artifacts: ModelArtifacts {
                manifest,
                predictors,
                samples: pooled,
            },
        })
    }
}

/// Train one instance of every kind on `data`; failures are logged and dropped.
pub(crate) fn fit_predictors(
    kinds: &[PredictorKind],
    data: &Dataset,
    options: &TrainOptions,
) -> Vec<Box<dyn Predictor>> {
    kinds
        .par_iter()
        .filter_map(|kind| {
            let mut predictor = kind.create();
            match predictor.train(data, None, options) {
                Ok(_) => Some(predictor),
                Err(e) => {
                    warn!(predictor = kind.name(), error = %e, "final fit failed, predictor dropped");
                    None
                }
            }
        })
        .collect()
}

/// Ranked importance from the first predictor that supports attribution.
pub(crate) fn first_importance(predictors: &[Box<dyn Predictor>]) -> Option<Vec<(String, f64)>> {
    predictors.iter().find_map(|p| p.feature_importance())
}

/// Outcomes of every predictor for one feature vector.
pub fn predict_all(
    predictors: &[Box<dyn Predictor>],
    input: PredictorInput<'_>,
) -> BTreeMap<String, PredictorOutcome> {
    predictors
        .iter()
        .map(|p| (p.name().to_string(), p.predict(input).into()))
        .collect()
}

/// Fraction of `data` where the fused signal matches the label; `None` when empty.
pub fn ensemble_accuracy(
    fusion: &FusionEngine,
    predictors: &[Box<dyn Predictor>],
    data: &Dataset,
) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let correct = data
        .samples
        .iter()
        .filter(|sample| {
            let vector = FeatureVector::new(&data.schema, sample.features.clone());
            let outcomes = predict_all(predictors, PredictorInput::Features(&vector));
            fusion.fuse(&outcomes).signal == sample.label
        })
        .count();
    Some(correct as f64 / data.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantsig_core::features::FeatureConfig;
    use quantsig_core::synthetic::random_walk;

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 5,
            test_fraction: 0.2,
            min_data_points: 200,
            ..TrainingConfig::default()
        }
    }

    fn small_walk_forward() -> WalkForwardConfig {
        WalkForwardConfig {
            initial_train_size: 120,
            validation_size: 40,
            step_size: 40,
        }
    }

    #[test]
    fn short_symbols_are_skipped() {
        let builder = FeatureBuilder::new(FeatureConfig::compact()).unwrap();
        let pipeline = TrainingPipeline::new(
            &builder,
            small_walk_forward(),
            quick_config(),
            EnsembleWeights::default(),
        );
        let request = TrainingRequest {
            symbols: vec![
                ("AAA".into(), random_walk(300, 1)),
                ("BBB".into(), random_walk(150, 2)),
            ],
            epochs: None,
        };
        let outcome = pipeline.run(&request, None).unwrap();
        assert_eq!(outcome.report.skipped.len(), 1);
        assert_eq!(outcome.report.skipped[0].symbol, "BBB");
        assert!(outcome.report.per_symbol_test_accuracy.contains_key("AAA"));
        assert_eq!(outcome.artifacts.manifest.summary.symbols, vec!["AAA".to_string()]);
    }

    #[test]
    fn no_usable_symbols_is_an_error() {
        let builder = FeatureBuilder::new(FeatureConfig::compact()).unwrap();
        let pipeline = TrainingPipeline::new(
            &builder,
            small_walk_forward(),
            quick_config(),
            EnsembleWeights::default(),
        );
        let request = TrainingRequest {
            symbols: vec![("AAA".into(), random_walk(50, 1))],
            epochs: None,
        };
        assert!(matches!(
            pipeline.run(&request, None),
            Err(TrainingError::NoUsableSymbols { skipped: 1 })
        ));
    }

    #[test]
    fn cancelled_before_first_fold() {
        let builder = FeatureBuilder::new(FeatureConfig::compact()).unwrap();
        let pipeline = TrainingPipeline::new(
            &builder,
            small_walk_forward(),
            quick_config(),
            EnsembleWeights::default(),
        );
        let request = TrainingRequest {
            symbols: vec![("AAA".into(), random_walk(300, 1))],
            epochs: None,
        };
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            pipeline.run(&request, Some(&cancel)),
            Err(TrainingError::Cancelled)
        ));
    }

    #[test]
    fn development_samples_stay_before_test_range() {
        let builder = FeatureBuilder::new(FeatureConfig::compact()).unwrap();
        let pipeline = TrainingPipeline::new(
            &builder,
            small_walk_forward(),
            quick_config(),
            EnsembleWeights::default(),
        );
        let request = TrainingRequest {
            symbols: vec![("AAA".into(), random_walk(300, 3))],
            epochs: Some(3),
        };
        let outcome = pipeline.run(&request, None).unwrap();
        // 300 bars, 20% test → test starts at 240; labels look 5 bars ahead.
        assert!(outcome
            .artifacts
            .samples
            .samples
            .iter()
            .all(|s| s.bar_index + 5 < 240));
        assert_eq!(outcome.artifacts.manifest.summary.epochs, 3);
        assert!(outcome
            .report
            .folds
            .iter()
            .all(|f| f.validation_end <= 240));
    }
}
