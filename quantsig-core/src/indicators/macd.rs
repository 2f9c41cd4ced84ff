//! MACD: moving average convergence/divergence.
//!
//! line = EMA(fast) - EMA(slow); signal = EMA(line, signal_period);
//! histogram = line - signal. All EMAs are seeded with the first value, so
//! MACD has no warm-up gap (values are unstable for early bars).

use super::moving_average::ema_seeded;
use super::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(
    series: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdSeries, IndicatorError> {
    check_period("fast", fast)?;
    check_period("slow", slow)?;
    check_period("signal", signal)?;
    Ok(macd_values(series, fast, slow, signal))
}

fn macd_values(series: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_seeded(series, fast);
    let slow_ema = ema_seeded(series, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_seeded(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(l, s)| l - s).collect();
    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Which MACD output a column exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct MacdColumn {
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
    name: String,
}

impl MacdColumn {
    pub fn new(
        fast: usize,
        slow: usize,
        signal: usize,
        output: MacdOutput,
    ) -> Result<Self, IndicatorError> {
        check_period("fast", fast)?;
        check_period("slow", slow)?;
        check_period("signal", signal)?;
        let name = match output {
            MacdOutput::Line => "macd",
            MacdOutput::Signal => "macd_signal",
            MacdOutput::Histogram => "macd_hist",
        };
        Ok(Self {
            fast,
            slow,
            signal,
            output,
            name: name.to_string(),
        })
    }
}

impl Indicator for MacdColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let out = macd_values(&closes, self.fast, self.slow, self.signal);
        match self.output {
            MacdOutput::Line => out.line,
            MacdOutput::Signal => out.signal,
            MacdOutput::Histogram => out.histogram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::moving_average::exponential_average;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn macd_line_is_ema_difference() {
        let series: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let out = macd(&series, 12, 26, 9).unwrap();
        let fast = exponential_average(&series, 12).unwrap();
        let slow = exponential_average(&series, 26).unwrap();
        for i in 0..series.len() {
            assert_approx(out.line[i], fast[i] - slow[i], DEFAULT_EPSILON);
            assert_approx(out.histogram[i], out.line[i] - out.signal[i], DEFAULT_EPSILON);
        }
    }

    #[test]
    fn macd_constant_series_is_zero() {
        let out = macd(&[50.0; 30], 12, 26, 9).unwrap();
        assert!(out.line.iter().all(|v| v.abs() < DEFAULT_EPSILON));
        assert!(out.signal.iter().all(|v| v.abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn macd_rejects_zero_periods() {
        assert!(macd(&[1.0, 2.0], 0, 26, 9).is_err());
        assert!(macd(&[1.0, 2.0], 12, 26, 0).is_err());
    }

    #[test]
    fn columns_select_outputs() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let out = macd(&closes, 12, 26, 9).unwrap();
        let hist = MacdColumn::new(12, 26, 9, MacdOutput::Histogram).unwrap();
        assert_eq!(hist.name(), "macd_hist");
        assert_eq!(hist.compute(&bars), out.histogram);
    }
}
