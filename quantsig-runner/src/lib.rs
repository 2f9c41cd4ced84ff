//! quantsig runner: validation, training and serving on top of `quantsig-core`.
//!
//! This crate provides:
//! - Pluggable predictors behind one capability set
//! - Walk-forward fold planning with a held-out test range
//! - Overfitting detection, early stopping and temporal augmentation
//! - Weighted ensemble fusion of predictor outputs
//! - Training orchestration across symbols on a rayon pool
//! - Incremental retraining with experience replay
//! - Versioned model store and price history sources
//! - [`EngineContext`], the entry point used by the CLI

pub mod config;
pub mod fusion;
pub mod incremental;
pub mod overfitting;
pub mod predictor;
pub mod service;
pub mod source;
pub mod store;
pub mod training;
pub mod walk_forward;

pub use config::{ConfigError, EngineConfig, EnsembleConfig, ServingConfig};
pub use fusion::{ConfidenceLevel, EnsembleWeights, FusedSignal, FusionEngine, FusionError};
pub use incremental::{
    experience_replay, progressive_batches, IncrementalConfig, IncrementalError,
    IncrementalLearner, IncrementalOutcome,
};
pub use overfitting::{augment_temporal, detect_overfitting, should_stop_early, FoldGate};
pub use predictor::{
    Predictor, PredictorError, PredictorInput, PredictorKind, PredictorOutcome, PredictorOutput,
    TrainOptions, TrainingHistory,
};
pub use service::{
    BatchPrediction, EngineContext, EngineError, EvaluationResponse, ExplainRequest, Explanation,
    PredictionRequest, PredictionResponse, ResponseStatus, TrainingResponse,
};
pub use source::{CsvSource, Interval, PriceHistorySource, SourceError, SyntheticSource};
pub use store::{FsModelStore, ModelArtifacts, ModelManifest, ModelStore, StoreError, VersionKind};
pub use training::{
    FoldReport, SkippedSymbol, TrainingConfig, TrainingError, TrainingOutcome, TrainingPipeline,
    TrainingRequest,
};
pub use walk_forward::{
    final_test_split, plan_folds, split, Fold, TestSplit, WalkForwardConfig, WalkForwardError,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn predictors_are_send_sync() {
        assert_send::<Box<dyn Predictor>>();
        assert_sync::<Box<dyn Predictor>>();
        assert_send::<PredictorOutcome>();
        assert_sync::<PredictorOutcome>();
    }

    #[test]
    fn artifacts_are_send_sync() {
        assert_send::<ModelArtifacts>();
        assert_sync::<ModelArtifacts>();
        assert_send::<FsModelStore>();
        assert_sync::<FsModelStore>();
    }

    #[test]
    fn engine_context_is_send_sync() {
        assert_send::<EngineContext>();
        assert_sync::<EngineContext>();
        assert_send::<FusionEngine>();
        assert_sync::<FusionEngine>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<EngineConfig>();
        assert_sync::<EngineConfig>();
        assert_send::<Fold>();
        assert_sync::<Fold>();
    }
}
