//! Feature engineering: schema, feature vectors, labelled datasets.
//!
//! The [`FeatureBuilder`] turns a bar series into one feature vector per bar
//! plus a forward label. A row is emitted only when every feature is finite;
//! warm-up rows are dropped, never filled. Labels look `lookahead` bars into
//! the future and are therefore undefined for the last `lookahead` bars.

pub mod builder;
pub mod dataset;
pub mod schema;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::IndicatorError;
use crate::patterns::PatternConfig;

pub use builder::FeatureBuilder;
pub use dataset::{Dataset, FeatureMatrix, FeatureRow, LabeledSample};
pub use schema::{FeatureSchema, FeatureVector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("invalid feature configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error("feature schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },
    #[error("insufficient data: {needed} bars needed, {available} available")]
    InsufficientData { needed: usize, available: usize },
    #[error("feature {feature} is not finite ({value})")]
    NonFinite { feature: String, value: f64 },
}

/// Moving-average family used by cross-over flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageKind {
    Sma,
    Ema,
}

impl AverageKind {
    pub fn column(self, period: usize) -> String {
        match self {
            AverageKind::Sma => format!("sma_{period}"),
            AverageKind::Ema => format!("ema_{period}"),
        }
    }
}

/// 0/1 flag: fast average above slow average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossPair {
    pub kind: AverageKind,
    pub fast: usize,
    pub slow: usize,
}

/// Feature-set parameters. Changing any of them changes the schema id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// RSI periods, one column each (default [14, 7]).
    pub rsi_periods: Vec<usize>,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Periods for both SMA and EMA columns (default [10, 20, 50, 200]).
    pub ma_periods: Vec<usize>,
    pub atr_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub volume_sma_period: usize,
    pub volume_fast: usize,
    pub volume_slow: usize,
    pub stochastic_period: usize,
    pub stochastic_smooth: usize,
    pub vortex_period: usize,
    pub adx_period: usize,
    /// Short volume window compared against the volume SMA (default 5).
    pub volume_trend_window: usize,
    /// SMA periods for close-vs-average distance columns (default [50, 200]).
    pub price_vs_sma: Vec<usize>,
    pub cross_pairs: Vec<CrossPair>,
    /// Forward horizon of the label in bars (default 5).
    pub lookahead: usize,
    /// Forward return beyond which a bar is BUY or SELL (default 0.01).
    pub label_threshold: f64,
    pub patterns: PatternConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rsi_periods: vec![14, 7],
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            ma_periods: vec![10, 20, 50, 200],
            atr_period: 14,
            bollinger_period: 20,
            bollinger_std: 2.0,
            volume_sma_period: 20,
            volume_fast: 12,
            volume_slow: 26,
            stochastic_period: 14,
            stochastic_smooth: 3,
            vortex_period: 14,
            adx_period: 14,
            volume_trend_window: 5,
            price_vs_sma: vec![50, 200],
            cross_pairs: vec![
                CrossPair {
                    kind: AverageKind::Sma,
                    fast: 20,
                    slow: 50,
                },
                CrossPair {
                    kind: AverageKind::Sma,
                    fast: 50,
                    slow: 200,
                },
                CrossPair {
                    kind: AverageKind::Ema,
                    fast: 10,
                    slow: 20,
                },
            ],
            lookahead: 5,
            label_threshold: 0.01,
            patterns: PatternConfig::default(),
        }
    }
}

impl FeatureConfig {
    /// Short-window variant for small series and tests: every indicator
    /// warms up within 30 bars.
    pub fn compact() -> Self {
        Self {
            rsi_periods: vec![14, 7],
            ma_periods: vec![5, 10, 20],
            bollinger_period: 10,
            volume_sma_period: 10,
            stochastic_period: 10,
            vortex_period: 10,
            adx_period: 7,
            price_vs_sma: vec![10, 20],
            cross_pairs: vec![
                CrossPair {
                    kind: AverageKind::Sma,
                    fast: 5,
                    slow: 20,
                },
                CrossPair {
                    kind: AverageKind::Ema,
                    fast: 5,
                    slow: 10,
                },
            ],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.rsi_periods.is_empty() || self.ma_periods.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "rsi_periods and ma_periods must not be empty".into(),
            ));
        }
        if self.lookahead == 0 {
            return Err(FeatureError::InvalidConfig("lookahead must be positive".into()));
        }
        if !self.label_threshold.is_finite() || self.label_threshold < 0.0 {
            return Err(FeatureError::InvalidConfig(format!(
                "label_threshold must be finite and non-negative, got {}",
                self.label_threshold
            )));
        }
        for &p in &self.price_vs_sma {
            if !self.ma_periods.contains(&p) {
                return Err(FeatureError::InvalidConfig(format!(
                    "price_vs_sma period {p} is not in ma_periods"
                )));
            }
        }
        for pair in &self.cross_pairs {
            if !self.ma_periods.contains(&pair.fast) || !self.ma_periods.contains(&pair.slow) {
                return Err(FeatureError::InvalidConfig(format!(
                    "cross pair {}/{} uses a period outside ma_periods",
                    pair.fast, pair.slow
                )));
            }
        }
        Ok(())
    }
}
