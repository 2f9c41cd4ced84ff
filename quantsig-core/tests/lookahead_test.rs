//! Look-ahead contamination tests.
//!
//! Invariant: no indicator value, pattern flag or feature value at bar t may
//! depend on bar t+1 or later.
//!
//! Method: compute on a truncated series (bars 0..n) and on the full series
//! (bars 0..N). Every value for bars 0..n must be identical between both
//! runs. Any difference means future data is leaking into the past.

use quantsig_core::domain::Bar;
use quantsig_core::features::{FeatureBuilder, FeatureConfig};
use quantsig_core::indicators::*;
use quantsig_core::patterns::{PatternDetector, PatternKind};
use quantsig_core::synthetic::random_walk;

/// Values for bars `0..cut` must not change when later bars are appended.
fn assert_prefix_stable(column: &dyn Indicator, bars: &[Bar], cut: usize) {
    let prefix = column.compute(&bars[..cut]);
    let whole = column.compute(bars);
    assert_eq!(prefix.len(), cut, "{}: prefix length", column.name());
    assert_eq!(whole.len(), bars.len(), "{}: full length", column.name());

    for (i, (p, w)) in prefix.iter().zip(&whole).enumerate() {
        let same = (p.is_nan() && w.is_nan()) || (p - w).abs() < 1e-10;
        assert!(same, "{} leaks at bar {i}: prefix={p}, full={w}", column.name());
    }
}

fn all_columns() -> Vec<Box<dyn Indicator>> {
    vec![
        Box::new(Sma::new(20).unwrap()),
        Box::new(Ema::new(20).unwrap()),
        Box::new(Rsi::new(14).unwrap()),
        Box::new(Rsi::new(7).unwrap()),
        Box::new(MacdColumn::new(12, 26, 9, MacdOutput::Line).unwrap()),
        Box::new(MacdColumn::new(12, 26, 9, MacdOutput::Signal).unwrap()),
        Box::new(MacdColumn::new(12, 26, 9, MacdOutput::Histogram).unwrap()),
        Box::new(BollingerColumn::new(20, 2.0, BollingerBand::Upper).unwrap()),
        Box::new(BollingerColumn::new(20, 2.0, BollingerBand::Middle).unwrap()),
        Box::new(BollingerColumn::new(20, 2.0, BollingerBand::Lower).unwrap()),
        Box::new(Atr::new(14).unwrap()),
        Box::new(StochasticColumn::new(14, 3, StochasticLine::K).unwrap()),
        Box::new(StochasticColumn::new(14, 3, StochasticLine::D).unwrap()),
        Box::new(VortexColumn::new(14, VortexLine::Positive).unwrap()),
        Box::new(VortexColumn::new(14, VortexLine::Negative).unwrap()),
        Box::new(Adx::new(14).unwrap()),
        Box::new(VolumeSma::new(20).unwrap()),
        Box::new(VolumeOscillator::new(12, 26).unwrap()),
        Box::new(Obv),
    ]
}

#[test]
fn indicators_have_no_lookahead() {
    let bars = random_walk(200, 1);
    for column in all_columns() {
        assert_prefix_stable(column.as_ref(), &bars, 100);
    }
}

#[test]
fn indicators_have_no_lookahead_at_every_cut() {
    let bars = random_walk(80, 2);
    let columns = all_columns();
    for cut in [1, 2, 15, 27, 28, 40, 79] {
        for column in &columns {
            assert_prefix_stable(column.as_ref(), &bars, cut);
        }
    }
}

#[test]
fn warmup_lengths_match_lookback() {
    let bars = random_walk(120, 3);
    for column in all_columns() {
        let values = column.compute(&bars);
        let lookback = column.lookback();
        assert!(
            values[..lookback].iter().all(|v| v.is_nan()),
            "{}: value inside warm-up",
            column.name()
        );
        assert!(
            !values[lookback].is_nan(),
            "{}: NaN right after warm-up (lookback {lookback})",
            column.name()
        );
    }
}

#[test]
fn patterns_have_no_lookahead() {
    let bars = random_walk(150, 4);
    let detector = PatternDetector::default();
    let truncated = &bars[..90];
    for i in 0..90 {
        for kind in PatternKind::ALL {
            assert_eq!(
                detector.detect(kind, truncated, i),
                detector.detect(kind, &bars, i),
                "{kind:?} differs at bar {i}"
            );
        }
    }
}

#[test]
fn feature_rows_have_no_lookahead() {
    let bars = random_walk(160, 5);
    let builder = FeatureBuilder::new(FeatureConfig::compact()).unwrap();
    let full = builder.build(&bars);
    let truncated = builder.build(&bars[..100]);
    assert!(!truncated.is_empty());

    for row in &truncated.rows {
        let full_row = full
            .rows
            .iter()
            .find(|r| r.bar_index == row.bar_index)
            .expect("row present in full build");
        assert_eq!(row.values, full_row.values, "bar {}", row.bar_index);
        if let Some(label) = row.label {
            assert_eq!(Some(label), full_row.label);
        }
    }
}
