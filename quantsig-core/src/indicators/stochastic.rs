//! Stochastic oscillator.
//!
//! raw %K[t] = 100 * (close - lowest_low) / (highest_high - lowest_low) over
//! the trailing `period` bars, 50 when the range is zero.
//! %K = SMA(raw, smooth); %D = SMA(%K, smooth).
//! Lookbacks: %K period + smooth - 2, %D period + 2*smooth - 3.

use super::atr::columns;
use super::moving_average::rolling_mean;
use super::{check_period, check_same_len, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic_oscillator(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    smooth: usize,
) -> Result<StochasticSeries, IndicatorError> {
    check_period("period", period)?;
    check_period("smooth", smooth)?;
    check_same_len(&[high, low, close])?;
    Ok(stochastic_values(high, low, close, period, smooth))
}

fn stochastic_values(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    smooth: usize,
) -> StochasticSeries {
    let n = close.len();
    let mut raw = vec![f64::NAN; n];
    for i in period.saturating_sub(1)..n {
        let start = i + 1 - period;
        let hh = high[start..=i].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ll = low[start..=i].iter().copied().fold(f64::INFINITY, f64::min);
        if close[i].is_nan() || !hh.is_finite() || !ll.is_finite() {
            continue;
        }
        raw[i] = if hh == ll {
            50.0
        } else {
            100.0 * (close[i] - ll) / (hh - ll)
        };
    }
    let k = rolling_mean(&raw, smooth);
    let d = rolling_mean(&k, smooth);
    StochasticSeries { k, d }
}

/// Which stochastic line a column exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochasticLine {
    K,
    D,
}

#[derive(Debug, Clone)]
pub struct StochasticColumn {
    period: usize,
    smooth: usize,
    line: StochasticLine,
    name: String,
}

impl StochasticColumn {
    pub fn new(period: usize, smooth: usize, line: StochasticLine) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        check_period("smooth", smooth)?;
        let name = match line {
            StochasticLine::K => "stoch_k",
            StochasticLine::D => "stoch_d",
        };
        Ok(Self {
            period,
            smooth,
            line,
            name: name.to_string(),
        })
    }
}

impl Indicator for StochasticColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            StochasticLine::K => self.period + self.smooth - 2,
            StochasticLine::D => self.period + 2 * self.smooth - 3,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (high, low, close) = columns(bars);
        let out = stochastic_values(&high, &low, &close, self.period, self.smooth);
        match self.line {
            StochasticLine::K => out.k,
            StochasticLine::D => out.d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn flat_range_reads_fifty() {
        let flat = [10.0; 6];
        let out = stochastic_oscillator(&flat, &flat, &flat, 3, 1).unwrap();
        assert!(out.k[1].is_nan());
        assert_approx(out.k[2], 50.0, DEFAULT_EPSILON);
        assert_approx(out.d[5], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn close_at_high_reads_hundred() {
        let high = [10.0, 11.0, 12.0, 13.0];
        let low = [9.0, 10.0, 11.0, 12.0];
        let close = [10.0, 11.0, 12.0, 13.0];
        let out = stochastic_oscillator(&high, &low, &close, 3, 1).unwrap();
        assert_approx(out.k[2], 100.0, DEFAULT_EPSILON);
        assert_approx(out.k[3], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn warmup_matches_lookback() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64).cos() * 3.0).collect();
        let bars = make_bars(&closes);
        for line in [StochasticLine::K, StochasticLine::D] {
            let column = StochasticColumn::new(14, 3, line).unwrap();
            let values = column.compute(&bars);
            let lookback = column.lookback();
            assert!(values[..lookback].iter().all(|v| v.is_nan()));
            assert!(!values[lookback].is_nan());
        }
    }

    #[test]
    fn bounded_between_zero_and_hundred() {
        let closes: Vec<f64> = (0..40).map(|i| 50.0 + (i as f64 * 0.7).sin() * 8.0).collect();
        let bars = make_bars(&closes);
        let k = StochasticColumn::new(14, 3, StochasticLine::K).unwrap().compute(&bars);
        assert!(k.iter().filter(|v| !v.is_nan()).all(|v| (0.0..=100.0).contains(v)));
    }
}
