//! Gradient-boosted decision stumps for three classes.
//!
//! Each round fits one stump per class to the weighted softmax residuals
//! (`onehot - p`), choosing the single feature threshold with the largest
//! reduction in squared error. Leaf values are the weighted mean residual
//! scaled by the learning rate. Scores start at the log class prior.
//!
//! Feature importance counts how often each feature was split on, normalised
//! to sum to 1.

use std::path::Path;

use serde::{Deserialize, Serialize};

use quantsig_core::domain::Label;
use quantsig_core::features::{Dataset, FeatureSchema};
use quantsig_core::rng::RngHierarchy;

use super::{
    check_schema, cross_entropy, evaluation, read_model, sample_class_weights, softmax3,
    write_model, Evaluation, Predictor, PredictorError, PredictorInput, PredictorKind,
    PredictorOutput, TrainOptions, TrainingHistory,
};
use crate::overfitting::{augment_temporal, should_stop_early};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub class: usize,
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn apply(&self, values: &[f64]) -> f64 {
        if values[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BoostModel {
    schema: FeatureSchema,
    base: [f64; 3],
    /// Stumps in round order; a round holds at most one stump per class.
    rounds: Vec<Vec<Stump>>,
}

impl BoostModel {
    fn scores(&self, values: &[f64]) -> [f64; 3] {
        let mut out = self.base;
        for stump in self.rounds.iter().flatten() {
            out[stump.class] += stump.apply(values);
        }
        out
    }

    fn split_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.schema.len()];
        for stump in self.rounds.iter().flatten() {
            counts[stump.feature] += 1;
        }
        counts
    }
}

/// Hyper-parameters for [`StumpBoostPredictor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StumpBoostParams {
    /// Shrinkage applied to every leaf (default 0.3).
    pub learning_rate: f64,
    /// Minimum samples on each side of a split (default 5).
    pub min_leaf: usize,
}

impl Default for StumpBoostParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            min_leaf: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StumpBoostPredictor {
    params: StumpBoostParams,
    model: Option<BoostModel>,
}

/// Best split for one residual column, or `None` when no feature varies.
fn fit_stump(
    class: usize,
    columns: &[Vec<(f64, usize)>],
    residual: &[f64],
    weight: &[f64],
    params: &StumpBoostParams,
) -> Option<Stump> {
    let total_w: f64 = weight.iter().sum();
    let total_r: f64 = residual.iter().zip(weight).map(|(r, w)| r * w).sum();
    if total_w <= 0.0 {
        return None;
    }
    let base_score = total_r * total_r / total_w;

    let mut best: Option<(f64, Stump)> = None;
    for (feature, sorted) in columns.iter().enumerate() {
        let mut left_w = 0.0;
        let mut left_r = 0.0;
        for (pos, &(value, i)) in sorted.iter().enumerate() {
            left_w += weight[i];
            left_r += weight[i] * residual[i];
            let Some(&(next, _)) = sorted.get(pos + 1) else {
                break;
            };
            let left_n = pos + 1;
            if next <= value || left_n < params.min_leaf || sorted.len() - left_n < params.min_leaf
            {
                continue;
            }
            let right_w = total_w - left_w;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let right_r = total_r - left_r;
            let gain = left_r * left_r / left_w + right_r * right_r / right_w - base_score;
            if best.as_ref().map_or(true, |(g, _)| gain > *g) {
                best = Some((
                    gain,
                    Stump {
                        class,
                        feature,
                        threshold: (value + next) / 2.0,
                        left: params.learning_rate * left_r / left_w,
                        right: params.learning_rate * right_r / right_w,
                    },
                ));
            }
        }
    }
    best.filter(|(gain, _)| *gain > 1e-12).map(|(_, stump)| stump)
}

fn evaluate_rows(model: &BoostModel, rows: &[&[f64]], labels: &[Label]) -> Evaluation {
    let mut loss = 0.0;
    let mut correct = 0;
    for (row, &label) in rows.iter().zip(labels) {
        let p = softmax3(model.scores(row));
        loss += cross_entropy(&p, label);
        if p.argmax() == label {
            correct += 1;
        }
    }
    evaluation(loss, correct, rows.len())
}

impl StumpBoostPredictor {
    pub fn new(params: StumpBoostParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    /// Number of boosting rounds kept after training.
    pub fn rounds(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.rounds.len())
    }
}

impl Predictor for StumpBoostPredictor {
    fn name(&self) -> &str {
        PredictorKind::StumpBoost.name()
    }

    fn kind(&self) -> PredictorKind {
        PredictorKind::StumpBoost
    }

    fn train(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory, PredictorError> {
        let needed = 2 * self.params.min_leaf.max(1);
        if train.len() < needed {
            return Err(PredictorError::InsufficientData {
                needed,
                available: train.len(),
            });
        }

        let d = train.n_features();
        let rows: Vec<&[f64]> = train.samples.iter().map(|s| s.features.as_slice()).collect();
        let labels = train.labels();
        let mut rng = RngHierarchy::new(options.seed).rng_for("augment", self.name(), 0);
        let (rows, labels) = augment_temporal(&rows, &labels, options.shuffle_ratio, &mut rng);

        let class_weights = sample_class_weights(train, options.class_weights);
        let weight: Vec<f64> = labels.iter().map(|l| class_weights[l.index()]).collect();
        let total_w: f64 = weight.iter().sum();
        if total_w <= 0.0 {
            return Err(PredictorError::Training("all sample weights are zero".into()));
        }

        let mut prior = [0.0; 3];
        for (label, w) in labels.iter().zip(&weight) {
            prior[label.index()] += w / total_w;
        }
        let base = prior.map(|p: f64| p.max(1e-6).ln());

        let columns: Vec<Vec<(f64, usize)>> = (0..d)
            .map(|j| {
                let mut column: Vec<(f64, usize)> =
                    rows.iter().enumerate().map(|(i, r)| (r[j], i)).collect();
                column.sort_by(|a, b| a.0.total_cmp(&b.0));
                column
            })
            .collect();

        let val: Option<(Vec<&[f64]>, Vec<Label>)> = validation.filter(|v| !v.is_empty()).map(|v| {
            (
                v.samples.iter().map(|s| s.features.as_slice()).collect(),
                v.labels(),
            )
        });

        let mut model = BoostModel {
            schema: train.schema.clone(),
            base,
            rounds: Vec::new(),
        };
        let mut scores: Vec<[f64; 3]> = vec![base; rows.len()];
        let mut history = TrainingHistory::default();
        let mut best: Option<(f64, usize)> = None;

        for _ in 0..options.epochs.max(1) {
            let probs: Vec<[f64; 3]> = scores.iter().map(|s| softmax3(*s).0).collect();
            let mut round = Vec::with_capacity(3);
            for class in 0..3 {
                let residual: Vec<f64> = probs
                    .iter()
                    .zip(&labels)
                    .map(|(p, l)| {
                        let target = if l.index() == class { 1.0 } else { 0.0 };
                        target - p[class]
                    })
                    .collect();
                if let Some(stump) = fit_stump(class, &columns, &residual, &weight, &self.params) {
                    round.push(stump);
                }
            }
            if round.is_empty() {
                break;
            }
            for (score, row) in scores.iter_mut().zip(&rows) {
                for stump in &round {
                    score[stump.class] += stump.apply(row);
                }
            }
            model.rounds.push(round);

            history.push_train(evaluate_rows(&model, &rows, &labels));
            if let Some((vrows, vlabels)) = &val {
                let eval = evaluate_rows(&model, vrows, vlabels);
                history.push_val(eval);
                if best.map_or(true, |(loss, _)| eval.loss < loss) {
                    best = Some((eval.loss, model.rounds.len()));
                }
                if should_stop_early(&history.val_loss, options.patience) {
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if let Some((_, keep)) = best {
            model.rounds.truncate(keep);
        }
        self.model = Some(model);
        Ok(history)
    }

    fn predict(&self, input: PredictorInput<'_>) -> Result<PredictorOutput, PredictorError> {
        let PredictorInput::Features(vector) = input else {
            return Err(PredictorError::UnsupportedInput {
                predictor: self.name().to_string(),
                input: input.kind_name(),
            });
        };
        check_schema(self.model.as_ref().map(|m| &m.schema), self.name(), vector)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PredictorError::NotTrained(self.name().to_string()))?;
        Ok(PredictorOutput::from_probabilities(softmax3(
            model.scores(&vector.values),
        )))
    }

    fn save(&self, dir: &Path) -> Result<(), PredictorError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PredictorError::NotTrained(self.name().to_string()))?;
        write_model(dir, model)
    }

    fn load(&mut self, dir: &Path) -> Result<(), PredictorError> {
        self.model = Some(read_model(dir)?);
        Ok(())
    }

    fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        let model = self.model.as_ref()?;
        let counts = model.split_counts();
        let total: usize = counts.iter().sum();
        let mut ranked: Vec<(String, f64)> = model
            .schema
            .names()
            .iter()
            .zip(&counts)
            .map(|(name, &c)| {
                let score = if total == 0 { 0.0 } else { c as f64 / total as f64 };
                (name.clone(), score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Some(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::separable_dataset;
    use quantsig_core::features::FeatureVector;

    fn options(epochs: usize) -> TrainOptions {
        TrainOptions {
            epochs,
            patience: epochs,
            shuffle_ratio: 0.0,
            ..TrainOptions::default()
        }
    }

    #[test]
    fn fits_threshold_rule() {
        let data = separable_dataset(300);
        let mut predictor = StumpBoostPredictor::default();
        predictor.train(&data, None, &options(30)).unwrap();
        let eval = predictor.evaluate(&data).unwrap();
        assert!(eval.accuracy > 0.9, "accuracy {}", eval.accuracy);
    }

    #[test]
    fn importance_prefers_signal_feature() {
        let data = separable_dataset(300);
        let mut predictor = StumpBoostPredictor::default();
        predictor.train(&data, None, &options(20)).unwrap();
        let ranked = predictor.feature_importance().unwrap();
        assert_eq!(ranked[0].0, "signal");
        let total: f64 = ranked.iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn untrained_has_no_importance() {
        assert!(StumpBoostPredictor::default().feature_importance().is_none());
    }

    #[test]
    fn validation_truncates_to_best_round() {
        let data = separable_dataset(300);
        let train = data.within(0..200);
        let val = data.within(200..300);
        let mut predictor = StumpBoostPredictor::default();
        let history = predictor
            .train(&train, Some(&val), &options(25))
            .unwrap();
        assert!(predictor.rounds() <= history.epochs_run());
        assert!(predictor.rounds() >= 1);
    }

    #[test]
    fn stump_split_is_midpoint() {
        let columns = vec![vec![(0.0, 0), (1.0, 1), (2.0, 2), (3.0, 3)]];
        let residual = [-1.0, -1.0, 1.0, 1.0];
        let weight = [1.0; 4];
        let params = StumpBoostParams {
            learning_rate: 1.0,
            min_leaf: 1,
        };
        let stump = fit_stump(2, &columns, &residual, &weight, &params).unwrap();
        assert_eq!(stump.threshold, 1.5);
        assert_eq!(stump.left, -1.0);
        assert_eq!(stump.right, 1.0);
    }

    #[test]
    fn constant_features_yield_no_stump() {
        let columns = vec![vec![(1.0, 0), (1.0, 1), (1.0, 2)]];
        let params = StumpBoostParams {
            learning_rate: 1.0,
            min_leaf: 1,
        };
        assert!(fit_stump(0, &columns, &[1.0, -1.0, 0.0], &[1.0; 3], &params).is_none());
    }

    #[test]
    fn save_load_round_trip() {
        let data = separable_dataset(120);
        let mut predictor = StumpBoostPredictor::default();
        predictor.train(&data, None, &options(10)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        predictor.save(dir.path()).unwrap();
        let mut restored = StumpBoostPredictor::default();
        restored.load(dir.path()).unwrap();
        assert_eq!(restored.rounds(), predictor.rounds());

        let vector = FeatureVector::new(&data.schema, vec![1.0, 0.1]);
        let a = predictor.predict(PredictorInput::Features(&vector)).unwrap();
        let b = restored.predict(PredictorInput::Features(&vector)).unwrap();
        assert_eq!(a.probabilities.argmax(), b.probabilities.argmax());
        assert_eq!(a.probabilities.argmax(), Label::Buy);
    }
}
