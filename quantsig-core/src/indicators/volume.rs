//! Volume indicators: volume SMA, volume oscillator and on-balance volume.
//!
//! - Volume oscillator: (EMA_fast - EMA_slow) / EMA_slow of volume, NaN when
//!   the slow average is zero.
//! - OBV: starts at the first volume; each later bar adds its volume unless
//!   the close fell, in which case it subtracts it.

use super::moving_average::{ema_seeded, rolling_mean};
use super::{check_period, check_same_len, Indicator, IndicatorError};
use crate::domain::Bar;

pub fn volume_oscillator(
    volume: &[f64],
    fast: usize,
    slow: usize,
) -> Result<Vec<f64>, IndicatorError> {
    check_period("fast", fast)?;
    check_period("slow", slow)?;
    Ok(oscillator_values(volume, fast, slow))
}

fn oscillator_values(volume: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let fast_ema = ema_seeded(volume, fast);
    let slow_ema = ema_seeded(volume, slow);
    fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(&f, &s)| if s == 0.0 { f64::NAN } else { (f - s) / s })
        .collect()
}

pub fn on_balance_volume(close: &[f64], volume: &[f64]) -> Result<Vec<f64>, IndicatorError> {
    check_same_len(&[close, volume])?;
    Ok(obv_values(close, volume))
}

fn obv_values(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(close.len());
    let mut running = 0.0;
    for i in 0..close.len() {
        let signed = if i > 0 && close[i] < close[i - 1] {
            -volume[i]
        } else {
            volume[i]
        };
        running += signed;
        result.push(running);
    }
    result
}

#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    name: String,
}

impl VolumeSma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        Ok(Self {
            period,
            name: format!("volume_sma_{period}"),
        })
    }
}

impl Indicator for VolumeSma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        rolling_mean(&volume, self.period)
    }
}

#[derive(Debug, Clone)]
pub struct VolumeOscillator {
    fast: usize,
    slow: usize,
}

impl VolumeOscillator {
    pub fn new(fast: usize, slow: usize) -> Result<Self, IndicatorError> {
        check_period("fast", fast)?;
        check_period("slow", slow)?;
        Ok(Self { fast, slow })
    }
}

impl Indicator for VolumeOscillator {
    fn name(&self) -> &str {
        "volume_oscillator"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        oscillator_values(&volume, self.fast, self.slow)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        obv_values(&close, &volume)
    }
}
