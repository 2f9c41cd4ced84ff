//! ADX: Average Directional Index (Wilder).
//!
//! Steps:
//! 1. +DM and -DM from consecutive bars (defined from index 1)
//! 2. Wilder-smooth +DM, -DM and TR (TR also from index 1)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR), -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! Lookback: 2 * period - 1.

use super::atr::{columns, true_range, wilder_smooth};
use super::{check_period, check_same_len, Indicator, IndicatorError};
use crate::domain::Bar;

pub fn average_directional_index(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> Result<Vec<f64>, IndicatorError> {
    check_period("period", period)?;
    check_same_len(&[high, low, close])?;
    Ok(adx_values(high, low, close, period))
}

fn adx_values(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    if n < 2 {
        return vec![f64::NAN; n];
    }

    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up.is_nan() || down.is_nan() {
            continue;
        }
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }

    let mut tr = true_range(high, low, close);
    tr[0] = f64::NAN;

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let mut dx = vec![f64::NAN; n];
    for i in 0..n {
        if smooth_tr[i].is_nan() || smooth_plus[i].is_nan() || smooth_minus[i].is_nan() {
            continue;
        }
        if smooth_tr[i] == 0.0 {
            dx[i] = 0.0;
            continue;
        }
        let plus_di = 100.0 * smooth_plus[i] / smooth_tr[i];
        let minus_di = 100.0 * smooth_minus[i] / smooth_tr[i];
        let di_sum = plus_di + minus_di;
        dx[i] = if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        };
    }

    wilder_smooth(&dx, period)
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        Ok(Self {
            period,
            name: format!("adx_{period}"),
        })
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (high, low, close) = columns(bars);
        adx_values(&high, &low, &close, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn adx_bounds() {
        let closes = [102.0, 106.0, 99.0, 101.0, 105.0, 108.0, 110.0, 105.0, 107.0, 112.0];
        let result = Adx::new(3).unwrap().compute(&make_bars(&closes));
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "ADX out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn strong_trend_is_elevated() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 5.0).collect();
        let result = Adx::new(5).unwrap().compute(&make_bars(&closes));
        let last = result.last().copied().unwrap();
        assert!(last > 50.0, "ADX should be elevated in a strong trend, got {last}");
    }

    #[test]
    fn first_value_at_lookback() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.5).sin() * 4.0).collect();
        let adx = Adx::new(5).unwrap();
        let result = adx.compute(&make_bars(&closes));
        assert!(result[..adx.lookback()].iter().all(|v| v.is_nan()));
        assert!(!result[adx.lookback()].is_nan());
    }

    #[test]
    fn too_few_bars() {
        let result = average_directional_index(&[105.0], &[95.0], &[100.0], 3).unwrap();
        assert!(result[0].is_nan());
    }
}
