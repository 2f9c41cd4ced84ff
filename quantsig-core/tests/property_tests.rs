//! Property tests for the core transforms.
//!
//! Uses proptest to verify:
//! 1. Indicator outputs have the input length and NaN only inside the warm-up
//! 2. RSI and stochastic stay in [0, 100]
//! 3. Pattern detectors never panic, whatever the index
//! 4. Forward labels are undefined exactly for the last `lookahead` bars
//! 5. Class probabilities always sum to 1

use proptest::prelude::*;
use quantsig_core::domain::{forward_labels, Bar, ClassProbabilities};
use quantsig_core::indicators::*;
use quantsig_core::patterns::{PatternDetector, PatternKind};
use quantsig_core::synthetic::from_returns;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_returns(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.05..0.05_f64, 1..max_len)
}

fn arb_bars(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    arb_returns(max_len).prop_map(|r| from_returns(100.0, &r))
}

fn arb_period() -> impl Strategy<Value = usize> {
    1usize..30
}

// ── 1. Shape and warm-up ─────────────────────────────────────────────

proptest! {
    #[test]
    fn sma_preserves_length_and_warmup(
        bars in arb_bars(120),
        period in arb_period(),
    ) {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let sma = moving_average(&closes, period).unwrap();
        prop_assert_eq!(sma.len(), closes.len());
        for (i, v) in sma.iter().enumerate() {
            prop_assert_eq!(v.is_nan(), i + 1 < period);
        }
    }

    #[test]
    fn ema_has_no_gap(bars in arb_bars(120), period in arb_period()) {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema = exponential_average(&closes, period).unwrap();
        prop_assert_eq!(ema.len(), closes.len());
        prop_assert!(ema.iter().all(|v| v.is_finite()));
        prop_assert_eq!(ema[0], closes[0]);
    }

    #[test]
    fn atr_is_non_negative(bars in arb_bars(120), period in arb_period()) {
        let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let atr = average_true_range(&high, &low, &close, period).unwrap();
        prop_assert_eq!(atr.len(), bars.len());
        prop_assert!(atr.iter().filter(|v| !v.is_nan()).all(|&v| v >= 0.0));
    }
}

// ── 2. Bounded oscillators ───────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_bounded(bars in arb_bars(150), period in arb_period()) {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rsi = relative_strength_index(&closes, period).unwrap();
        for (i, &v) in rsi.iter().enumerate() {
            if i < period || i >= closes.len() {
                prop_assert!(v.is_nan());
            } else {
                prop_assert!((0.0..=100.0).contains(&v), "RSI {} at {}", v, i);
            }
        }
    }

    #[test]
    fn stochastic_bounded(bars in arb_bars(150)) {
        let column = StochasticColumn::new(14, 3, StochasticLine::D).unwrap();
        for v in column.compute(&bars).into_iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=100.0 + 1e-9).contains(&v));
        }
    }
}

// ── 3. Pattern detectors are total ───────────────────────────────────

proptest! {
    #[test]
    fn patterns_never_panic(bars in arb_bars(60), index in 0usize..100) {
        let detector = PatternDetector::default();
        let flags = detector.detect_all(&bars, index);
        prop_assert_eq!(flags.len(), PatternKind::ALL.len());
        if index >= bars.len() {
            prop_assert!(flags.values().all(|f| !f));
        }
    }
}

// ── 4. Labels ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn labels_undefined_only_in_tail(returns in arb_returns(80), lookahead in 1usize..10) {
        let bars = from_returns(100.0, &returns);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let labels = forward_labels(&closes, lookahead, 0.01);
        prop_assert_eq!(labels.len(), closes.len());
        for (i, label) in labels.iter().enumerate() {
            prop_assert_eq!(label.is_none(), i + lookahead >= closes.len());
        }
    }
}

// ── 5. Probabilities ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn probabilities_sum_to_one(a in 0.0..10.0_f64, b in 0.0..10.0_f64, c in 0.0..10.0_f64) {
        let p = ClassProbabilities::from_scores([a, b, c]);
        prop_assert!((p.sum() - 1.0).abs() < 1e-9);
        prop_assert!(p.0.iter().all(|&x| x >= 0.0));
    }
}
