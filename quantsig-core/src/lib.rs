//! quantsig core: bars, indicators, candlestick patterns, features, regimes.
//!
//! Everything in this crate is a pure, synchronous transform over a bar
//! series:
//! - Domain types (bars, labels, class probabilities)
//! - Indicator library with NaN warm-up semantics
//! - Pattern detector over `(bars, index)`
//! - Feature builder with a stable, hashed schema and forward labels
//! - Regime detection from the slope of recent returns
//! - Deterministic RNG hierarchy and synthetic bar generators

pub mod domain;
pub mod features;
pub mod indicators;
pub mod patterns;
pub mod regime;
pub mod rng;
pub mod synthetic;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::ClassProbabilities>();
        require_sync::<domain::ClassProbabilities>();
        require_send::<features::FeatureBuilder>();
        require_sync::<features::FeatureBuilder>();
        require_send::<features::Dataset>();
        require_sync::<features::Dataset>();
        require_send::<features::FeatureVector>();
        require_sync::<features::FeatureVector>();
        require_send::<indicators::IndicatorValues>();
        require_sync::<indicators::IndicatorValues>();
        require_send::<patterns::PatternDetector>();
        require_sync::<patterns::PatternDetector>();
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }
}
