//! Feature builder: bars in, schema-ordered feature rows out.
//!
//! Column layout (fixed order):
//! 1. RSI per period, MACD line/signal/histogram
//! 2. SMA then EMA per moving-average period
//! 3. ATR, Bollinger upper/mid/lower
//! 4. volume SMA, volume oscillator, OBV
//! 5. stochastic K/D, vortex +/-, ADX
//! 6. price action: daily return, range/body/wick as a fraction of the open
//! 7. volume profile: volume vs its SMA, short volume mean vs its SMA
//! 8. close vs SMA per configured period, position inside the Bollinger bands
//! 9. 0/1 moving-average cross flags
//! 10. 0/1 pattern flags
//!
//! Every value at bar t reads bars 0..=t only; the label reads bar
//! t + lookahead and is kept separate from the values.

use crate::domain::{forward_labels, Bar};
use crate::indicators::moving_average::rolling_mean;
use crate::indicators::{
    Adx, Atr, BollingerBand, BollingerColumn, Ema, Indicator, IndicatorValues, MacdColumn,
    MacdOutput, Obv, Rsi, Sma, StochasticColumn, StochasticLine, VolumeOscillator, VolumeSma,
    VortexColumn, VortexLine,
};
use crate::patterns::{PatternDetector, PatternKind};

use super::{
    CrossPair, Dataset, FeatureConfig, FeatureError, FeatureMatrix, FeatureRow, FeatureSchema,
    FeatureVector,
};

/// Where one feature column gets its value.
#[derive(Debug, Clone)]
enum Source {
    Column(String),
    DailyReturn,
    PriceRangePct,
    BodyRangePct,
    UpperWickPct,
    LowerWickPct,
    VolumeVsMa,
    VolumeTrend,
    PriceVsSma(String),
    PriceVsBands,
    Cross { fast: String, slow: String },
    Pattern(PatternKind),
}

pub struct FeatureBuilder {
    config: FeatureConfig,
    schema: FeatureSchema,
    columns: Vec<Box<dyn Indicator>>,
    sources: Vec<Source>,
    detector: PatternDetector,
    volume_sma: String,
}

impl std::fmt::Debug for FeatureBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureBuilder")
            .field("schema", &self.schema.id())
            .field("features", &self.schema.len())
            .finish()
    }
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        let columns = indicator_columns(&config)?;

        let mut names = Vec::new();
        let mut sources = Vec::new();
        let mut push = |name: String, source: Source| {
            names.push(name);
            sources.push(source);
        };

        for column in &columns {
            push(column.name().to_string(), Source::Column(column.name().to_string()));
        }
        push("daily_return".into(), Source::DailyReturn);
        push("price_range_pct".into(), Source::PriceRangePct);
        push("body_range_pct".into(), Source::BodyRangePct);
        push("upper_wick_pct".into(), Source::UpperWickPct);
        push("lower_wick_pct".into(), Source::LowerWickPct);
        push("volume_vs_ma".into(), Source::VolumeVsMa);
        push("volume_trend".into(), Source::VolumeTrend);
        for &p in &config.price_vs_sma {
            push(format!("price_vs_sma_{p}"), Source::PriceVsSma(format!("sma_{p}")));
        }
        push("price_vs_bb".into(), Source::PriceVsBands);
        for CrossPair { kind, fast, slow } in &config.cross_pairs {
            let (fast, slow) = (kind.column(*fast), kind.column(*slow));
            push(format!("{fast}_gt_{slow}"), Source::Cross { fast, slow });
        }
        for kind in PatternKind::ALL {
            push(kind.feature_name(), Source::Pattern(kind));
        }

        Ok(Self {
            schema: FeatureSchema::new(names),
            volume_sma: format!("volume_sma_{}", config.volume_sma_period),
            detector: PatternDetector::new(config.patterns.clone()),
            columns,
            sources,
            config,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Leading bars that can never produce a complete row.
    pub fn warmup(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.lookback())
            .max()
            .unwrap_or(0)
            .max(self.config.volume_trend_window.saturating_sub(1))
            .max(1)
    }

    /// Feature rows for every bar with a fully finite feature vector.
    pub fn build(&self, bars: &[Bar]) -> FeatureMatrix {
        let values = IndicatorValues::compute_all(&self.columns, bars);
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let volume_short = rolling_mean(&volume, self.config.volume_trend_window.max(1));
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let labels = forward_labels(&closes, self.config.lookahead, self.config.label_threshold);

        let mut rows = Vec::new();
        for (i, bar) in bars.iter().enumerate() {
            let row: Vec<f64> = self
                .sources
                .iter()
                .map(|source| self.evaluate(source, bars, i, &values, &volume_short))
                .collect();
            if row.iter().all(|v| v.is_finite()) {
                rows.push(FeatureRow {
                    bar_index: i,
                    timestamp: bar.timestamp,
                    values: row,
                    label: labels[i],
                });
            }
        }

        FeatureMatrix {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Labelled rows only.
    pub fn build_dataset(&self, bars: &[Bar]) -> Dataset {
        self.build(bars).into_dataset()
    }

    /// Feature vector of the most recent bar, for serving.
    pub fn latest_vector(&self, bars: &[Bar]) -> Result<FeatureVector, FeatureError> {
        let matrix = self.build(bars);
        match matrix.rows.last() {
            Some(row) if row.bar_index + 1 == bars.len() => {
                Ok(FeatureVector::new(&self.schema, row.values.clone()))
            }
            _ => Err(FeatureError::InsufficientData {
                needed: self.warmup() + 1,
                available: bars.len(),
            }),
        }
    }

    fn evaluate(
        &self,
        source: &Source,
        bars: &[Bar],
        i: usize,
        values: &IndicatorValues,
        volume_short: &[f64],
    ) -> f64 {
        let bar = &bars[i];
        match source {
            Source::Column(name) => values.value(name, i),
            Source::DailyReturn => {
                if i == 0 {
                    f64::NAN
                } else {
                    (bar.close - bars[i - 1].close) / bars[i - 1].close
                }
            }
            Source::PriceRangePct => bar.range() / bar.open,
            Source::BodyRangePct => (bar.close - bar.open) / bar.open,
            Source::UpperWickPct => bar.upper_wick() / bar.open,
            Source::LowerWickPct => bar.lower_wick() / bar.open,
            Source::VolumeVsMa => bar.volume / values.value(&self.volume_sma, i),
            Source::VolumeTrend => volume_short[i] / values.value(&self.volume_sma, i),
            Source::PriceVsSma(column) => {
                let sma = values.value(column, i);
                (bar.close - sma) / sma
            }
            Source::PriceVsBands => {
                let upper = values.value("bb_upper", i);
                let lower = values.value("bb_lower", i);
                (bar.close - lower) / (upper - lower)
            }
            Source::Cross { fast, slow } => {
                let (f, s) = (values.value(fast, i), values.value(slow, i));
                if f.is_nan() || s.is_nan() {
                    f64::NAN
                } else if f > s {
                    1.0
                } else {
                    0.0
                }
            }
            Source::Pattern(kind) => {
                if self.detector.detect(*kind, bars, i) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

fn indicator_columns(config: &FeatureConfig) -> Result<Vec<Box<dyn Indicator>>, FeatureError> {
    let mut columns: Vec<Box<dyn Indicator>> = Vec::new();
    for &p in &config.rsi_periods {
        columns.push(Box::new(Rsi::new(p)?));
    }
    for output in [MacdOutput::Line, MacdOutput::Signal, MacdOutput::Histogram] {
        columns.push(Box::new(MacdColumn::new(
            config.macd_fast,
            config.macd_slow,
            config.macd_signal,
            output,
        )?));
    }
    for &p in &config.ma_periods {
        columns.push(Box::new(Sma::new(p)?));
    }
    for &p in &config.ma_periods {
        columns.push(Box::new(Ema::new(p)?));
    }
    columns.push(Box::new(Atr::new(config.atr_period)?));
    for band in [BollingerBand::Upper, BollingerBand::Middle, BollingerBand::Lower] {
        columns.push(Box::new(BollingerColumn::new(
            config.bollinger_period,
            config.bollinger_std,
            band,
        )?));
    }
    columns.push(Box::new(VolumeSma::new(config.volume_sma_period)?));
    columns.push(Box::new(VolumeOscillator::new(config.volume_fast, config.volume_slow)?));
    columns.push(Box::new(Obv));
    for line in [StochasticLine::K, StochasticLine::D] {
        columns.push(Box::new(StochasticColumn::new(
            config.stochastic_period,
            config.stochastic_smooth,
            line,
        )?));
    }
    for line in [VortexLine::Positive, VortexLine::Negative] {
        columns.push(Box::new(VortexColumn::new(config.vortex_period, line)?));
    }
    columns.push(Box::new(Adx::new(config.adx_period)?));
    Ok(columns)
}
