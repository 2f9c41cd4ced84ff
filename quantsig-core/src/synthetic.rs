//! Deterministic synthetic bar series for development and tests.
//!
//! These are clearly fake. Each generator is seeded so the same arguments
//! always give the same series.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;

/// Trading-day timestamps starting 2020-01-02, weekends skipped.
pub fn trading_days(n: usize) -> Vec<NaiveDateTime> {
    let mut day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day.and_hms_opt(0, 0, 0).unwrap_or_default());
        }
        day += Duration::days(1);
    }
    out
}

/// Random walk from 100.0 with daily returns in ±3%, seeded through BLAKE3.
pub fn random_walk(n: usize, seed: u64) -> Vec<Bar> {
    let digest = blake3::hash(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*digest.as_bytes());
    let mut price = 100.0_f64;

    trading_days(n)
        .into_iter()
        .map(|timestamp| {
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000.0..5_000_000.0);
            price = close;
            Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}

/// Bars whose close-to-close returns follow `returns` exactly.
///
/// Open is the previous close, the wicks extend 0.5% past the body and
/// volume cycles deterministically.
pub fn from_returns(start_price: f64, returns: &[f64]) -> Vec<Bar> {
    let mut price = start_price;
    trading_days(returns.len())
        .into_iter()
        .zip(returns)
        .enumerate()
        .map(|(i, (timestamp, r))| {
            let open = price;
            let close = price * (1.0 + r);
            price = close;
            Bar {
                timestamp,
                open,
                high: open.max(close) * 1.005,
                low: open.min(close) * 0.995,
                close,
                volume: 1_000_000.0 + (i % 7) as f64 * 50_000.0,
            }
        })
        .collect()
}

/// Steady uptrend of `drift` per bar whose last 60 returns accelerate
/// linearly by `acceleration` per bar, so the trailing returns slope upward.
pub fn accelerating_uptrend(n: usize, drift: f64, acceleration: f64) -> Vec<Bar> {
    let ramp_start = n.saturating_sub(60);
    let returns: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                0.0
            } else if i < ramp_start {
                drift
            } else {
                drift + acceleration * (i - ramp_start) as f64
            }
        })
        .collect();
    from_returns(100.0, &returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check_ordering;

    #[test]
    fn random_walk_is_deterministic_and_valid() {
        let a = random_walk(300, 42);
        let b = random_walk(300, 42);
        let c = random_walk(300, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(check_ordering(&a).is_ok());
    }

    #[test]
    fn trading_days_skip_weekends() {
        let days = trading_days(10);
        assert!(days
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn from_returns_reproduces_returns() {
        let returns = [0.0, 0.01, -0.02, 0.03];
        let bars = from_returns(50.0, &returns);
        for i in 1..bars.len() {
            let r = bars[i].close / bars[i - 1].close - 1.0;
            assert!((r - returns[i]).abs() < 1e-12);
        }
        assert!(check_ordering(&bars).is_ok());
    }
}
