//! Indicator trait and precomputed indicator values container.
//!
//! Column types wrap the series functions of this module so the feature
//! builder can compute every named input once per bar series.

use crate::domain::Bar;
use std::collections::HashMap;

/// A named output column computed from a bar series.
///
/// `compute` returns a `Vec<f64>` of the same length as `bars` whose first
/// `lookback()` values are `f64::NAN`.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Every column must give
/// identical values on a truncated series and on the full series.
pub trait Indicator: Send + Sync {
    /// Column name as it appears in the feature schema (e.g. "sma_20").
    fn name(&self) -> &str;

    /// Number of leading bars without a valid value.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Container for precomputed indicator series, queried by bar index.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every column over `bars`.
    pub fn compute_all(columns: &[Box<dyn Indicator>], bars: &[Bar]) -> Self {
        let mut values = Self::new();
        for column in columns {
            values.insert(column.name(), column.compute(bars));
        }
        values
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of a named series at a bar index; `None` when the name is
    /// unknown or the index is out of range.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    /// Like [`get`](Self::get) but folds a missing entry into NaN.
    pub fn value(&self, name: &str, bar_index: usize) -> f64 {
        self.get(name, bar_index).unwrap_or(f64::NAN)
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
