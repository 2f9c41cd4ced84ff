//! Vortex indicator.
//!
//! VM+[t] = |high[t] - low[t-1]|, VM-[t] = |low[t] - high[t-1]|.
//! VI+ = sum(VM+, period) / sum(TR, period), VI- likewise, sums over the
//! trailing `period` bars. Lookback: period (needs a previous bar).

use super::atr::{columns, true_range};
use super::{check_period, check_same_len, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct VortexSeries {
    pub positive: Vec<f64>,
    pub negative: Vec<f64>,
}

pub fn vortex(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> Result<VortexSeries, IndicatorError> {
    check_period("period", period)?;
    check_same_len(&[high, low, close])?;
    Ok(vortex_values(high, low, close, period))
}

fn vortex_values(high: &[f64], low: &[f64], close: &[f64], period: usize) -> VortexSeries {
    let n = close.len();
    let mut out = VortexSeries {
        positive: vec![f64::NAN; n],
        negative: vec![f64::NAN; n],
    };
    if n <= period {
        return out;
    }

    let tr = true_range(high, low, close);
    for i in period..n {
        let start = i + 1 - period;
        let mut vm_plus = 0.0;
        let mut vm_minus = 0.0;
        let mut tr_sum = 0.0;
        for j in start..=i {
            vm_plus += (high[j] - low[j - 1]).abs();
            vm_minus += (low[j] - high[j - 1]).abs();
            tr_sum += tr[j];
        }
        if tr_sum.is_nan() || tr_sum == 0.0 {
            continue;
        }
        out.positive[i] = vm_plus / tr_sum;
        out.negative[i] = vm_minus / tr_sum;
    }
    out
}

/// Which vortex line a column exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VortexLine {
    Positive,
    Negative,
}

#[derive(Debug, Clone)]
pub struct VortexColumn {
    period: usize,
    line: VortexLine,
    name: String,
}

impl VortexColumn {
    pub fn new(period: usize, line: VortexLine) -> Result<Self, IndicatorError> {
        check_period("period", period)?;
        let name = match line {
            VortexLine::Positive => "vi_pos",
            VortexLine::Negative => "vi_neg",
        };
        Ok(Self {
            period,
            line,
            name: name.to_string(),
        })
    }
}

impl Indicator for VortexColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (high, low, close) = columns(bars);
        let out = vortex_values(&high, &low, &close, self.period);
        match self.line {
            VortexLine::Positive => out.positive,
            VortexLine::Negative => out.negative,
        }
    }
}
