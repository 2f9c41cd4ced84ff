//! Market regime detection from the trend of recent returns.
//!
//! The regime is the sign of the least-squares slope of the trailing
//! `lookback` returns against their position. A slope smaller in magnitude
//! than [`SLOPE_THRESHOLD`] is SIDEWAYS. Fewer than `lookback` returns also
//! read as SIDEWAYS.
//!
//! Note the slope is taken over returns, not prices: a price series rising
//! by a constant amount per bar has slowly *falling* returns and reads as
//! SIDEWAYS.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Minimum |slope| of returns per bar for a directional regime.
pub const SLOPE_THRESHOLD: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Bull,
    Bear,
    Sideways,
}

/// Regime plus the statistics it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReport {
    pub regime: Regime,
    pub slope: f64,
    /// Population standard deviation of the same returns window.
    pub volatility: f64,
}

pub fn detect_regime(returns: &[f64], lookback: usize) -> Regime {
    regime_report(returns, lookback).regime
}

pub fn regime_report(returns: &[f64], lookback: usize) -> RegimeReport {
    if lookback < 2 || returns.len() < lookback {
        return RegimeReport {
            regime: Regime::Sideways,
            slope: 0.0,
            volatility: 0.0,
        };
    }
    let window = &returns[returns.len() - lookback..];
    let slope = ols_slope(window);
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let volatility =
        (window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / window.len() as f64).sqrt();

    let regime = if !slope.is_finite() || slope.abs() < SLOPE_THRESHOLD {
        Regime::Sideways
    } else if slope > 0.0 {
        Regime::Bull
    } else {
        Regime::Bear
    };
    RegimeReport {
        regime,
        slope,
        volatility,
    }
}

/// Class weights `[SELL, HOLD, BUY]` favouring the regime's direction.
pub fn regime_class_weights(regime: Regime) -> [f64; 3] {
    match regime {
        Regime::Bull => [0.5, 1.0, 2.0],
        Regime::Bear => [2.0, 1.0, 0.5],
        Regime::Sideways => [1.0, 1.5, 1.0],
    }
}

/// Close-to-close simple returns; one shorter than `bars`.
pub fn simple_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
