//! Simple and exponential moving averages.
//!
//! - SMA: trailing mean over `period` values; first valid index `period - 1`.
//!   A NaN anywhere in the window yields NaN.
//! - EMA: multiplier `2 / (period + 1)`, seeded with the first raw value, so
//!   there is no warm-up gap. Once a NaN is seen every later value is NaN.

use super::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

/// Trailing simple moving average.
pub fn moving_average(series: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("period", period)?;
    Ok(rolling_mean(series, period))
}

/// Exponential moving average seeded with `series[0]`.
pub fn exponential_average(series: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period("period", period)?;
    Ok(ema_seeded(series, period))
}

pub(crate) fn rolling_mean(series: &[f64], period: usize) -> Vec<f64> {
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &value) in series.iter().enumerate() {
        if value.is_nan() {
            nan_count += 1;
        } else {
            sum += value;
        }
        if i >= period {
            let leaving = series[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}

pub(crate) fn ema_seeded(series: &[f64], period: usize) -> Vec<f64> {
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    if n == 0 || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = series[0];
    if prev.is_nan() {
        return result;
    }
    result[0] = prev;

    for i in 1..n {
        if series[i].is_nan() {
            return result;
        }
        let ema = alpha * series[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }
    result
}

/// SMA of close prices.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        Ok(Self {
            period,
            name: format!("sma_{period}"),
        })
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
    }
}

/// EMA of close prices.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        Ok(Self {
            period,
            name: format!("ema_{period}"),
        })
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_seeded(&closes, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let series = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        let result = moving_average(&series, 5).unwrap();

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_nan(), "expected NaN at index {i}");
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_2_over_four_values() {
        let result = moving_average(&[10.0, 20.0, 30.0, 40.0], 2).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result[0].is_nan());
        assert_approx(result[1], 15.0, DEFAULT_EPSILON);
        assert_approx(result[2], 25.0, DEFAULT_EPSILON);
        assert_approx(result[3], 35.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_propagation() {
        let series = [10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0];
        let result = moving_average(&series, 3).unwrap();
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_few_values() {
        let result = moving_average(&[10.0, 11.0], 5).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn zero_period_rejected() {
        assert!(matches!(
            moving_average(&[1.0], 0),
            Err(IndicatorError::InvalidParameter { .. })
        ));
        assert!(exponential_average(&[1.0], 0).is_err());
        assert!(Sma::new(0).is_err());
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn ema_seeded_with_first_value() {
        // alpha = 0.5: 10, 10.5, 11.25, 12.125
        let result = exponential_average(&[10.0, 11.0, 12.0, 13.0], 3).unwrap();
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 10.5, DEFAULT_EPSILON);
        assert_approx(result[2], 11.25, DEFAULT_EPSILON);
        assert_approx(result[3], 12.125, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_period_1_equals_input() {
        let result = exponential_average(&[100.0, 200.0, 300.0], 1).unwrap();
        assert_eq!(result, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn ema_nan_taints_rest() {
        let result = exponential_average(&[10.0, 11.0, f64::NAN, 13.0], 3).unwrap();
        assert!(!result[1].is_nan());
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
    }

    #[test]
    fn columns_match_functions() {
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let bars = make_bars(&closes);
        let sma = Sma::new(3).unwrap();
        let ema = Ema::new(3).unwrap();
        assert_eq!(sma.name(), "sma_3");
        assert_eq!(sma.lookback(), 2);
        assert_eq!(ema.lookback(), 0);
        let from_column = sma.compute(&bars);
        let from_fn = moving_average(&closes, 3).unwrap();
        for i in 2..closes.len() {
            assert_approx(from_column[i], from_fn[i], DEFAULT_EPSILON);
        }
        assert_eq!(ema.compute(&bars), exponential_average(&closes, 3).unwrap());
    }
}
