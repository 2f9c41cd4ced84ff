//! Criterion benchmarks for the serving and training hot loops.
//!
//! Run with: `cargo bench -p quantsig-runner`
//!
//! - Fusion of predictor outcomes (called once per prediction)
//! - Softmax and stump-boost fits on one walk-forward fold

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quantsig_core::domain::ClassProbabilities;
use quantsig_core::features::{FeatureBuilder, FeatureConfig};
use quantsig_core::synthetic::random_walk;
use quantsig_runner::{
    EnsembleWeights, FusionEngine, PredictorKind, PredictorOutcome, PredictorOutput,
    TrainOptions, WalkForwardConfig,
};

fn outcomes(failed: usize) -> BTreeMap<String, PredictorOutcome> {
    PredictorKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let outcome = if i < failed {
                PredictorOutcome::failed("benchmark failure")
            } else {
                PredictorOutcome::Success(PredictorOutput::from_probabilities(
                    ClassProbabilities::from_scores([1.0 + i as f64, 2.0, 3.0]),
                ))
            };
            (kind.name().to_string(), outcome)
        })
        .collect()
}

fn bench_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion");
    let engine = FusionEngine::new(EnsembleWeights::default());

    for failed in [0usize, 1, 3] {
        let outcomes = outcomes(failed);
        group.bench_with_input(BenchmarkId::from_parameter(failed), &failed, |b, _| {
            b.iter(|| engine.fuse(black_box(&outcomes)));
        });
    }

    group.finish();
}

fn bench_fold_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_fit");
    group.sample_size(10);

    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let bars = random_walk(1260, 7);
    let dataset = builder.build_dataset(&bars);
    let folds = WalkForwardConfig::default().split(bars.len()).unwrap();
    let (train, validation) = folds[0].partition(&dataset, builder.config().lookahead);
    let options = TrainOptions {
        epochs: 20,
        ..TrainOptions::default()
    };

    for kind in [PredictorKind::Softmax, PredictorKind::StumpBoost] {
        group.bench_function(kind.name(), |b| {
            b.iter(|| {
                let mut predictor = kind.create();
                predictor
                    .train(black_box(&train), Some(&validation), &options)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fusion, bench_fold_fit);
criterion_main!(benches);
