//! Engine configuration, loaded from TOML.
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! [features]
//! lookahead = 5
//! label_threshold = 0.01
//!
//! [walk_forward]
//! initial_train_size = 500
//! validation_size = 100
//! step_size = 50
//!
//! [training]
//! epochs = 50
//! predictors = ["pattern", "softmax", "stump_boost"]
//!
//! [ensemble.weights]
//! pattern = 0.25
//! softmax = 0.35
//! stump_boost = 0.40
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use quantsig_core::features::FeatureConfig;
use quantsig_core::patterns::PatternConfig;

use crate::fusion::EnsembleWeights;
use crate::incremental::IncrementalConfig;
use crate::predictor::TrainOptions;
use crate::training::TrainingConfig;
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub weights: EnsembleWeights,
}

/// Prediction-time settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Bars required in a prediction request (default 60).
    pub min_bars: usize,
    /// Fused confidence below which a signal is not actionable (default 0.55).
    pub min_confidence: f64,
    /// Features returned by `explain` when not specified (default 10).
    pub top_n: usize,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            min_bars: 60,
            min_confidence: 0.55,
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    /// Overrides `features.patterns` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<PatternConfig>,
    pub walk_forward: WalkForwardConfig,
    pub training: TrainingConfig,
    pub ensemble: EnsembleConfig,
    pub incremental: IncrementalConfig,
    pub serving: ServingConfig,
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn check_fraction(name: &str, value: f64, allow_one: bool) -> Result<(), ConfigError> {
    let upper_ok = if allow_one { value <= 1.0 } else { value < 1.0 };
    if value.is_finite() && value >= 0.0 && upper_ok {
        Ok(())
    } else {
        Err(invalid(format!("{name} out of range: {value}")))
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Feature configuration with the top-level pattern thresholds applied.
    pub fn feature_config(&self) -> FeatureConfig {
        let mut features = self.features.clone();
        if let Some(patterns) = &self.patterns {
            features.patterns = patterns.clone();
        }
        features
    }

    /// Options for fitting predictors outside a walk-forward run.
    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            epochs: self.training.epochs,
            patience: self.training.patience,
            class_weights: None,
            shuffle_ratio: self.training.shuffle_ratio,
            seed: self.training.seed,
            patterns: Some(self.feature_config().patterns),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feature_config()
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        let wf = &self.walk_forward;
        if wf.initial_train_size == 0 || wf.validation_size == 0 || wf.step_size == 0 {
            return Err(invalid("walk_forward sizes must be positive"));
        }

        let t = &self.training;
        if t.epochs == 0 {
            return Err(invalid("training.epochs must be positive"));
        }
        if t.predictors.is_empty() {
            return Err(invalid("training.predictors must not be empty"));
        }
        check_fraction("training.test_fraction", t.test_fraction, false)?;
        check_fraction("training.shuffle_ratio", t.shuffle_ratio, true)?;
        if !t.overfitting_threshold.is_finite() || t.overfitting_threshold < 0.0 {
            return Err(invalid(format!(
                "training.overfitting_threshold out of range: {}",
                t.overfitting_threshold
            )));
        }
        if t.min_data_points < wf.min_bars() {
            warn!(
                min_data_points = t.min_data_points,
                walk_forward_min = wf.min_bars(),
                "symbols between the two minimums will be skipped by walk-forward planning"
            );
        }

        for kind in &t.predictors {
            if !self.ensemble.weights.as_map().contains_key(kind.name()) {
                warn!(predictor = kind.name(), "predictor has no ensemble weight");
            }
        }

        let inc = &self.incremental;
        if !inc.replay_ratio.is_finite() || inc.replay_ratio < 0.0 {
            return Err(invalid(format!(
                "incremental.replay_ratio out of range: {}",
                inc.replay_ratio
            )));
        }
        if inc.recent_window == 0 {
            return Err(invalid("incremental.recent_window must be positive"));
        }
        check_fraction("incremental.initial_fraction", inc.initial_fraction, true)?;
        if !(inc.growth.is_finite() && inc.growth > 1.0) {
            return Err(invalid(format!("incremental.growth must exceed 1, got {}", inc.growth)));
        }

        let s = &self.serving;
        if s.min_bars == 0 {
            return Err(invalid("serving.min_bars must be positive"));
        }
        check_fraction("serving.min_confidence", s.min_confidence, true)?;
        Ok(())
    }
}
