//! Support and resistance over a trailing window.

use super::{check_period, IndicatorError};

/// `(support, resistance)` = (min, max) of the last `period` values, or
/// `None` when the series is shorter than `period`.
pub fn support_resistance(
    series: &[f64],
    period: usize,
) -> Result<Option<(f64, f64)>, IndicatorError> {
    check_period("period", period)?;
    if series.len() < period {
        return Ok(None);
    }
    let window = &series[series.len() - period..];
    let support = window.iter().copied().fold(f64::INFINITY, f64::min);
    let resistance = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Some((support, resistance)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_trailing_window_only() {
        let series = [1.0, 50.0, 10.0, 12.0, 11.0];
        assert_eq!(support_resistance(&series, 3).unwrap(), Some((10.0, 12.0)));
    }

    #[test]
    fn short_series_has_no_levels() {
        assert_eq!(support_resistance(&[1.0, 2.0], 3).unwrap(), None);
        assert!(support_resistance(&[1.0], 0).is_err());
    }
}
