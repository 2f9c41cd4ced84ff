//! Property tests for validation and fusion.
//!
//! Uses proptest to verify:
//! 1. Walk-forward folds expand, never overlap validation and stay in range
//! 2. Purged training ranges keep every label horizon out of validation
//! 3. Fused probabilities sum to 1 and failed predictors are listed
//! 4. Experience replay keeps new samples first and never repeats old ones

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use quantsig_core::domain::ClassProbabilities;
use quantsig_runner::{
    experience_replay, final_test_split, split, EnsembleWeights, FusionEngine, PredictorOutcome,
    PredictorOutput,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_probabilities() -> impl Strategy<Value = ClassProbabilities> {
    prop::array::uniform3(0.0..10.0_f64)
        .prop_filter("non-zero total", |s| s.iter().sum::<f64>() > 1e-6)
        .prop_map(ClassProbabilities::from_scores)
}

fn arb_outcome() -> impl Strategy<Value = PredictorOutcome> {
    prop_oneof![
        3 => arb_probabilities()
            .prop_map(|p| PredictorOutcome::Success(PredictorOutput::from_probabilities(p))),
        1 => Just(PredictorOutcome::failed("model not loaded")),
    ]
}

fn arb_outcomes() -> impl Strategy<Value = BTreeMap<String, PredictorOutcome>> {
    prop::collection::btree_map(
        prop::sample::select(vec!["pattern", "softmax", "stump_boost", "unknown"])
            .prop_map(String::from),
        arb_outcome(),
        0..4,
    )
}

// ── 1. Fold geometry ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn folds_expand_inside_the_series(
        n in 0usize..2000,
        init in 1usize..600,
        val in 1usize..200,
        step in 1usize..100,
    ) {
        let folds = split(n, init, val, step).unwrap();
        if n >= init + val {
            prop_assert_eq!(folds.len(), (n - init - val) / step + 1);
        } else {
            prop_assert!(folds.is_empty());
        }
        for (i, fold) in folds.iter().enumerate() {
            prop_assert_eq!(fold.index, i);
            prop_assert_eq!(fold.train.start, 0);
            prop_assert_eq!(fold.validation.start, fold.train.end);
            prop_assert_eq!(fold.validation.len(), val);
            prop_assert!(fold.validation.end <= n);
        }
        for pair in folds.windows(2) {
            prop_assert!(pair[0].train.end < pair[1].train.end);
        }
    }

    #[test]
    fn test_range_is_the_trailing_fraction(n in 0usize..5000, frac in 0.0..0.99_f64) {
        let split = final_test_split(n, frac).unwrap();
        prop_assert_eq!(split.development.end, split.test.start);
        prop_assert_eq!(split.test.end, n);
        prop_assert_eq!(split.test.len(), (n as f64 * frac).floor() as usize);
    }
}

// ── 2. Purging ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn purged_labels_never_reach_validation(
        n in 100usize..1500,
        init in 20usize..300,
        val in 5usize..100,
        step in 1usize..80,
        lookahead in 1usize..20,
    ) {
        for fold in split(n, init, val, step).unwrap() {
            let purged = fold.purged_train(lookahead);
            prop_assert!(purged.end <= fold.train.end);
            if let Some(last) = purged.clone().last() {
                prop_assert!(last + lookahead < fold.validation.start);
            }
        }
    }
}

// ── 3. Fusion ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn fused_vector_is_a_distribution(outcomes in arb_outcomes()) {
        let engine = FusionEngine::new(EnsembleWeights::default());
        let fused = engine.fuse(&outcomes);
        prop_assert!((fused.details.fused.sum() - 1.0).abs() < 1e-9);
        prop_assert!((fused.confidence - fused.details.fused.max()).abs() < 1e-12);
        prop_assert_eq!(fused.signal, fused.details.fused.argmax());

        let failed: BTreeSet<&str> = outcomes
            .iter()
            .filter(|(_, o)| o.output().is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        let listed: BTreeSet<&str> = fused
            .details
            .failures
            .iter()
            .map(|f| f.predictor.as_str())
            .collect();
        prop_assert_eq!(failed, listed);
    }
}

// ── 4. Experience replay ─────────────────────────────────────────────

proptest! {
    #[test]
    fn replay_size_and_order(
        old_len in 0usize..300,
        new_len in 0usize..300,
        ratio in 0.0..2.0_f64,
        seed in any::<u64>(),
    ) {
        let old: Vec<usize> = (1000..1000 + old_len).collect();
        let new: Vec<usize> = (0..new_len).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mixed = experience_replay(&old, &new, ratio, &mut rng);

        let expected_replay = if old.is_empty() {
            0
        } else {
            ((new_len as f64 * ratio) as usize).min(old_len)
        };
        prop_assert_eq!(mixed.len(), new_len + expected_replay);
        prop_assert_eq!(&mixed[..new_len], new.as_slice());

        let replayed: BTreeSet<usize> = mixed[new_len..].iter().copied().collect();
        prop_assert_eq!(replayed.len(), expected_replay);
        prop_assert!(replayed.iter().all(|v| (1000..1000 + old_len).contains(v)));
    }
}
