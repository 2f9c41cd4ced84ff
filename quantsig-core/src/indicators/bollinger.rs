//! Bollinger Bands: moving average +/- a multiple of the standard deviation.
//!
//! Uses population stddev (divide by N). Lookback: period - 1.

use super::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(
    series: &[f64],
    period: usize,
    multiplier: f64,
) -> Result<BollingerSeries, IndicatorError> {
    check_period("period", period)?;
    check_multiplier(multiplier)?;
    Ok(bands(series, period, multiplier))
}

fn check_multiplier(multiplier: f64) -> Result<(), IndicatorError> {
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(IndicatorError::InvalidParameter {
            name: "std_dev_multiplier",
            reason: format!("must be finite and non-negative, got {multiplier}"),
        });
    }
    Ok(())
}

fn bands(series: &[f64], period: usize, multiplier: f64) -> BollingerSeries {
    let n = series.len();
    let mut out = BollingerSeries {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if n < period {
        return out;
    }

    for i in (period - 1)..n {
        let window = &series[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let width = multiplier * variance.sqrt();
        out.middle[i] = mean;
        out.upper[i] = mean + width;
        out.lower[i] = mean - width;
    }
    out
}

/// Which band a column exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

#[derive(Debug, Clone)]
pub struct BollingerColumn {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl BollingerColumn {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        check_multiplier(multiplier)?;
        let name = match band {
            BollingerBand::Upper => "bb_upper",
            BollingerBand::Middle => "bb_mid",
            BollingerBand::Lower => "bb_lower",
        };
        Ok(Self {
            period,
            multiplier,
            band,
            name: name.to_string(),
        })
    }
}

impl Indicator for BollingerColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let out = bands(&closes, self.period, self.multiplier);
        match self.band {
            BollingerBand::Upper => out.upper,
            BollingerBand::Middle => out.middle,
            BollingerBand::Lower => out.lower,
        }
    }
}
