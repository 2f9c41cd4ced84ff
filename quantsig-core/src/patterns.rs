//! Candlestick and chart pattern detection.
//!
//! Every detector is a stateless predicate over `(bars, index)` that reads
//! only bars at or before `index`. Detectors never panic: an index past the
//! end of the series, or one without enough preceding bars, reads as `false`.
//!
//! | pattern            | bars used                                    |
//! |--------------------|----------------------------------------------|
//! | engulfing          | index-1, index                               |
//! | hammer, inverted   | index (requires index >= 1)                  |
//! | doji               | index                                        |
//! | morning/evening    | index-2 ..= index                            |
//! | double bottom      | trailing `double_bottom_lookback` closes     |
//! | breakout           | `breakout_lookback` highs before index       |
//! | sideways breakout  | base of `sideways_lookback` bars, 5 bars gap |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Bars between the end of the sideways base and the breakout bar, inclusive
/// of the breakout bar.
const SIDEWAYS_GAP: usize = 5;

/// Pattern identifiers, in feature-schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    InvertedHammer,
    Doji,
    MorningStar,
    EveningStar,
    DoubleBottom,
    Breakout,
    SidewaysBreakout,
}

/// Directional reading of a pattern, used by rule-based predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl PatternKind {
    pub const ALL: [PatternKind; 10] = [
        PatternKind::BullishEngulfing,
        PatternKind::BearishEngulfing,
        PatternKind::Hammer,
        PatternKind::InvertedHammer,
        PatternKind::Doji,
        PatternKind::MorningStar,
        PatternKind::EveningStar,
        PatternKind::DoubleBottom,
        PatternKind::Breakout,
        PatternKind::SidewaysBreakout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternKind::BullishEngulfing => "bullish_engulfing",
            PatternKind::BearishEngulfing => "bearish_engulfing",
            PatternKind::Hammer => "hammer",
            PatternKind::InvertedHammer => "inverted_hammer",
            PatternKind::Doji => "doji",
            PatternKind::MorningStar => "morning_star",
            PatternKind::EveningStar => "evening_star",
            PatternKind::DoubleBottom => "double_bottom",
            PatternKind::Breakout => "breakout",
            PatternKind::SidewaysBreakout => "sideways_breakout",
        }
    }

    /// Feature column name for this pattern's 0/1 flag.
    pub fn feature_name(self) -> String {
        format!("pattern_{}", self.name())
    }

    pub fn from_feature_name(name: &str) -> Option<PatternKind> {
        let stripped = name.strip_prefix("pattern_")?;
        Self::ALL.into_iter().find(|k| k.name() == stripped)
    }

    pub fn bias(self) -> Bias {
        match self {
            PatternKind::BullishEngulfing
            | PatternKind::Hammer
            | PatternKind::MorningStar
            | PatternKind::DoubleBottom
            | PatternKind::Breakout
            | PatternKind::SidewaysBreakout => Bias::Bullish,
            PatternKind::BearishEngulfing
            | PatternKind::InvertedHammer
            | PatternKind::EveningStar => Bias::Bearish,
            PatternKind::Doji => Bias::Neutral,
        }
    }
}

/// Detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Maximum |open - close| / open for a doji (default 0.1).
    pub doji_threshold: f64,
    /// Closes inspected for a double bottom (default 20).
    pub double_bottom_lookback: usize,
    /// Relative tolerance between the two lows (default 0.02).
    pub double_bottom_tolerance: f64,
    /// Prior highs a breakout must clear (default 20).
    pub breakout_lookback: usize,
    /// Length of the sideways base (default 15).
    pub sideways_lookback: usize,
    /// Maximum (high - low) / low of the base (default 0.03).
    pub sideways_max_range: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            doji_threshold: 0.1,
            double_bottom_lookback: 20,
            double_bottom_tolerance: 0.02,
            breakout_lookback: 20,
            sideways_lookback: 15,
            sideways_max_range: 0.03,
        }
    }
}

/// Evaluates every pattern with one set of thresholds.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    pub fn detect(&self, kind: PatternKind, bars: &[Bar], index: usize) -> bool {
        if index >= bars.len() {
            return false;
        }
        let c = &self.config;
        match kind {
            PatternKind::BullishEngulfing => bullish_engulfing(bars, index),
            PatternKind::BearishEngulfing => bearish_engulfing(bars, index),
            PatternKind::Hammer => hammer(bars, index),
            PatternKind::InvertedHammer => inverted_hammer(bars, index),
            PatternKind::Doji => doji(bars, index, c.doji_threshold),
            PatternKind::MorningStar => morning_star(bars, index),
            PatternKind::EveningStar => evening_star(bars, index),
            PatternKind::DoubleBottom => double_bottom(
                bars,
                index,
                c.double_bottom_lookback,
                c.double_bottom_tolerance,
            ),
            PatternKind::Breakout => breakout(bars, index, c.breakout_lookback),
            PatternKind::SidewaysBreakout => {
                sideways_breakout(bars, index, c.sideways_lookback, c.sideways_max_range)
            }
        }
    }

    /// Every pattern at `index`, keyed in schema order.
    pub fn detect_all(&self, bars: &[Bar], index: usize) -> BTreeMap<PatternKind, bool> {
        PatternKind::ALL
            .into_iter()
            .map(|kind| (kind, self.detect(kind, bars, index)))
            .collect()
    }
}

/// Previous bar bearish, current bullish, current opens below the previous
/// close and closes above the previous open with a body over half the
/// previous body.
pub fn bullish_engulfing(bars: &[Bar], index: usize) -> bool {
    let Some((prev, curr)) = pair(bars, index) else {
        return false;
    };
    prev.is_bearish()
        && curr.is_bullish()
        && curr.open < prev.close
        && curr.close > prev.open
        && curr.body() > prev.body() * 0.5
}

/// Mirror image of [`bullish_engulfing`].
pub fn bearish_engulfing(bars: &[Bar], index: usize) -> bool {
    let Some((prev, curr)) = pair(bars, index) else {
        return false;
    };
    prev.is_bullish()
        && curr.is_bearish()
        && curr.open > prev.close
        && curr.close < prev.open
        && curr.body() > prev.body() * 0.5
}

/// Bullish candle with a lower wick over twice the body, an upper wick under
/// half the body and a body over 10% of the range.
pub fn hammer(bars: &[Bar], index: usize) -> bool {
    if index < 1 || index >= bars.len() {
        return false;
    }
    let bar = &bars[index];
    let body = bar.body();
    bar.lower_wick() > body * 2.0
        && bar.upper_wick() < body * 0.5
        && body > bar.range() * 0.1
        && bar.is_bullish()
}

/// Hammer turned upside down: long upper wick, short lower wick, bearish close.
pub fn inverted_hammer(bars: &[Bar], index: usize) -> bool {
    if index < 1 || index >= bars.len() {
        return false;
    }
    let bar = &bars[index];
    let body = bar.body();
    bar.upper_wick() > body * 2.0
        && bar.lower_wick() < body * 0.5
        && body > bar.range() * 0.1
        && bar.is_bearish()
}

pub fn doji(bars: &[Bar], index: usize, threshold: f64) -> bool {
    let Some(bar) = bars.get(index) else {
        return false;
    };
    bar.open > 0.0 && (bar.open - bar.close).abs() / bar.open < threshold
}

/// Bearish day, small-bodied day, bullish day closing above the first day's
/// body midpoint.
pub fn morning_star(bars: &[Bar], index: usize) -> bool {
    let Some([first, second, third]) = triple(bars, index) else {
        return false;
    };
    first.is_bearish()
        && second.body() < (first.open - first.close) * 0.5
        && third.is_bullish()
        && third.close > first.body_midpoint()
}

pub fn evening_star(bars: &[Bar], index: usize) -> bool {
    let Some([first, second, third]) = triple(bars, index) else {
        return false;
    };
    first.is_bullish()
        && second.body() < (first.close - first.open) * 0.5
        && third.is_bearish()
        && third.close < first.body_midpoint()
}

/// Two of the five lowest closes in the trailing window, at least three bars
/// apart and within `tolerance` of each other, with a rebound between them
/// above the higher low by more than `tolerance`.
pub fn double_bottom(bars: &[Bar], index: usize, lookback: usize, tolerance: f64) -> bool {
    if lookback < 2 || index >= bars.len() || index + 1 < lookback {
        return false;
    }
    let closes: Vec<f64> = bars[index + 1 - lookback..=index]
        .iter()
        .map(|b| b.close)
        .collect();

    let mut lowest: Vec<(usize, f64)> = closes.iter().copied().enumerate().collect();
    lowest.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    lowest.truncate(5);
    lowest.sort_by_key(|&(i, _)| i);

    let (i1, low1) = lowest[0];
    let (i2, low2) = lowest[1];
    if i2 - i1 < 3 {
        return false;
    }
    let higher_low = low1.max(low2);
    if higher_low <= 0.0 || (low1 - low2).abs() / higher_low > tolerance {
        return false;
    }
    let rebound = closes[i1..i2].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    rebound > higher_low * (1.0 + tolerance)
}

/// Close above the highest high of the `lookback` bars before `index`.
pub fn breakout(bars: &[Bar], index: usize, lookback: usize) -> bool {
    if lookback == 0 || index >= bars.len() || index < lookback {
        return false;
    }
    let prior_high = bars[index - lookback..index]
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    bars[index].close > prior_high
}

/// A tight base of `lookback` bars followed five bars later by a close above
/// the base high.
pub fn sideways_breakout(bars: &[Bar], index: usize, lookback: usize, max_range: f64) -> bool {
    if lookback == 0 || index >= bars.len() || index + 1 < lookback + SIDEWAYS_GAP {
        return false;
    }
    let start = index + 1 - (lookback + SIDEWAYS_GAP);
    let base = &bars[start..start + lookback];
    let base_high = base.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let base_low = base.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let range_pct = (base_high - base_low) / base_low.max(1e-9);
    range_pct <= max_range && bars[index].close > base_high
}

fn pair(bars: &[Bar], index: usize) -> Option<(&Bar, &Bar)> {
    if index < 1 || index >= bars.len() {
        return None;
    }
    Some((&bars[index - 1], &bars[index]))
}

fn triple(bars: &[Bar], index: usize) -> Option<[&Bar; 3]> {
    if index < 2 || index >= bars.len() {
        return None;
    }
    Some([&bars[index - 2], &bars[index - 1], &bars[index]])
}
