//! Indicator library.
//!
//! Every indicator is a pure function from one or more numeric series to a
//! series of the same length. Positions without enough history hold
//! `f64::NAN`; callers decide what to do with the warm-up prefix.
//!
//! Each function has a matching column type implementing [`Indicator`] so the
//! feature builder can precompute named series straight from bars.
//! Multi-output indicators (MACD, Bollinger, stochastic, vortex) expose one
//! column type per output.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod indicator;
pub mod levels;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;
pub mod volume;
pub mod vortex;

use thiserror::Error;

pub use adx::{average_directional_index, Adx};
pub use atr::{average_true_range, true_range, wilder_smooth, Atr};
pub use bollinger::{bollinger_bands, BollingerBand, BollingerColumn, BollingerSeries};
pub use indicator::{Indicator, IndicatorValues};
pub use levels::support_resistance;
pub use macd::{macd, MacdColumn, MacdOutput, MacdSeries};
pub use moving_average::{exponential_average, moving_average, Ema, Sma};
pub use rsi::{relative_strength_index, Rsi};
pub use stochastic::{stochastic_oscillator, StochasticColumn, StochasticLine, StochasticSeries};
pub use volume::{on_balance_volume, volume_oscillator, Obv, VolumeOscillator, VolumeSma};
pub use vortex::{vortex, VortexColumn, VortexLine, VortexSeries};

/// Errors raised by indicator functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("series length mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

pub(crate) fn check_period(name: &'static str, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter {
            name,
            reason: "must be positive".into(),
        });
    }
    Ok(())
}

pub(crate) fn check_same_len(series: &[&[f64]]) -> Result<(), IndicatorError> {
    let Some(first) = series.first() else {
        return Ok(());
    };
    for s in &series[1..] {
        if s.len() != first.len() {
            return Err(IndicatorError::ShapeMismatch {
                expected: first.len(),
                actual: s.len(),
            });
        }
    }
    Ok(())
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
