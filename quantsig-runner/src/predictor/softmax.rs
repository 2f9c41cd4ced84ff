//! Multinomial logistic regression over standardized features.
//!
//! Mini-batch gradient descent on weighted cross-entropy with L2 decay.
//! Sample weights combine inverse class frequency with the advisory class
//! weights from [`TrainOptions`]. Each epoch visits the (lightly
//! pair-shuffled) training samples in order. When a validation set is given,
//! the weights with the lowest validation loss are kept and training stops
//! early once the latest validation loss is the worst of the patience window.

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

const BATCH_SIZE: usize = 32;

/// Per-feature mean and standard deviation from the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[&[f64]], n_features: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v / n;
            }
        }
        let mut var = vec![0.0; n_features];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns keep scale 1 so they standardize to 0.
        let std = var
            .into_iter()
            .map(|v| if v > 1e-12 { v.sqrt() } else { 1.0 })
            .collect();
        Self { mean, std }
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SoftmaxModel {
    schema: FeatureSchema,
    scaler: Standardizer,
    /// One row per class: `n_features` weights followed by the bias.
    weights: [Vec<f64>; 3],
}

impl SoftmaxModel {
    fn scores(&self, z: &[f64]) -> [f64; 3] {
        let d = z.len();
        let mut out = [0.0; 3];
        for (k, row) in self.weights.iter().enumerate() {
            out[k] = row[d] + row[..d].iter().zip(z).map(|(w, x)| w * x).sum::<f64>();
        }
        out
    }

    fn evaluate_standardized(&self, rows: &[Vec<f64>], labels: &[Label]) -> Evaluation {
        let mut loss = 0.0;
        let mut correct = 0;
        for (z, &label) in rows.iter().zip(labels) {
            let p = softmax3(self.scores(z));
            loss += cross_entropy(&p, label);
            if p.argmax() == label {
                correct += 1;
            }
        }
        evaluation(loss, correct, rows.len())
    }
}

/// Hyper-parameters for [`SoftmaxPredictor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxParams {
    /// Step size (default 0.05).
    pub learning_rate: f64,
    /// L2 penalty on weights, not biases (default 1e-4).
    pub l2: f64,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SoftmaxPredictor {
    params: SoftmaxParams,
    model: Option<SoftmaxModel>,
}

impl SoftmaxPredictor {
    pub fn new(params: SoftmaxParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn step(&self, model: &mut SoftmaxModel, batch: &[(&Vec<f64>, Label, f64)]) {
        let d = model.scaler.mean.len();
        let mut grad = [vec![0.0; d + 1], vec![0.0; d + 1], vec![0.0; d + 1]];
        let mut weight_sum = 0.0;
        for &(z, label, w) in batch {
            let p = softmax3(model.scores(z));
            for (k, g) in grad.iter_mut().enumerate() {
                let target = if label.index() == k { 1.0 } else { 0.0 };
                let err = w * (p.0[k] - target);
                for (gj, x) in g[..d].iter_mut().zip(z.iter()) {
                    *gj += err * x;
                }
                g[d] += err;
            }
            weight_sum += w;
        }
        if weight_sum <= 0.0 {
            return;
        }
        let lr = self.params.learning_rate;
        for (row, g) in model.weights.iter_mut().zip(&grad) {
            for j in 0..=d {
                let decay = if j < d { self.params.l2 * row[j] } else { 0.0 };
                row[j] -= lr * (g[j] / weight_sum + decay);
            }
        }
    }
}

impl Predictor for SoftmaxPredictor {
    fn name(&self) -> &str {
        PredictorKind::Softmax.name()
    }

    fn kind(&self) -> PredictorKind {
        PredictorKind::Softmax
    }

    fn train(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory, PredictorError> {
        if train.len() < 2 {
            return Err(PredictorError::InsufficientData {
                needed: 2,
                available: train.len(),
            });
        }
        if let Some(val) = validation {
            if val.schema.id() != train.schema.id() {
                return Err(PredictorError::SchemaMismatch {
                    expected: train.schema.id().to_string(),
                    actual: val.schema.id().to_string(),
                });
            }
        }

        let d = train.n_features();
        let raw: Vec<&[f64]> = train.samples.iter().map(|s| s.features.as_slice()).collect();
        let scaler = Standardizer::fit(&raw, d);
        let rows: Vec<Vec<f64>> = raw.iter().map(|r| scaler.transform(r)).collect();
        let labels = train.labels();
        let class_weights = sample_class_weights(train, options.class_weights);

        let mut rng = RngHierarchy::new(options.seed).rng_for("augment", self.name(), 0);
        let (rows_aug, labels_aug) =
            augment_temporal(&rows, &labels, options.shuffle_ratio, &mut rng);
        let batch_items: Vec<(&Vec<f64>, Label, f64)> = rows_aug
            .iter()
            .zip(&labels_aug)
            .map(|(z, &label)| (z, label, class_weights[label.index()]))
            .collect();

        let val_rows: Option<(Vec<Vec<f64>>, Vec<Label>)> = validation
            .filter(|v| !v.is_empty())
            .map(|v| {
                let rows = v.samples.iter().map(|s| scaler.transform(&s.features)).collect();
                (rows, v.labels())
            });

        let mut model = SoftmaxModel {
            schema: train.schema.clone(),
            scaler,
            weights: [vec![0.0; d + 1], vec![0.0; d + 1], vec![0.0; d + 1]],
        };
        let mut best: Option<(f64, [Vec<f64>; 3])> = None;
        let mut history = TrainingHistory::default();

        for _ in 0..options.epochs.max(1) {
            for batch in batch_items.chunks(BATCH_SIZE) {
                self.step(&mut model, batch);
            }
            history.push_train(model.evaluate_standardized(&rows, &labels));

            if let Some((vrows, vlabels)) = &val_rows {
                let eval = model.evaluate_standardized(vrows, vlabels);
                history.push_val(eval);
                if best.as_ref().map_or(true, |(loss, _)| eval.loss < *loss) {
                    best = Some((eval.loss, model.weights.clone()));
                }
                if should_stop_early(&history.val_loss, options.patience) {
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if let Some((_, weights)) = best {
            model.weights = weights;
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
        let z = model.scaler.transform(&vector.values);
        Ok(PredictorOutput::from_probabilities(softmax3(model.scores(&z))))
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::test_support::separable_dataset;
    use quantsig_core::features::FeatureVector;

    fn options() -> TrainOptions {
        TrainOptions {
            epochs: 200,
            patience: 200,
            shuffle_ratio: 0.0,
            ..TrainOptions::default()
        }
    }

    #[test]
    fn learns_separable_classes() {
        let data = separable_dataset(300);
        let mut predictor = SoftmaxPredictor::new(SoftmaxParams {
            learning_rate: 0.5,
            l2: 0.0,
        });
        let history = predictor.train(&data, None, &options()).unwrap();
        assert_eq!(history.epochs_run(), 200);

        let eval = predictor.evaluate(&data).unwrap();
        assert!(eval.accuracy > 0.8, "accuracy {}", eval.accuracy);
        assert!(history.train_loss.last().unwrap() < &history.train_loss[0]);
    }

    #[test]
    fn predicts_extremes() {
        let data = separable_dataset(300);
        let mut predictor = SoftmaxPredictor::new(SoftmaxParams {
            learning_rate: 0.5,
            l2: 0.0,
        });
        predictor.train(&data, None, &options()).unwrap();

        let buy = FeatureVector::new(&data.schema, vec![1.4, 0.5]);
        let sell = FeatureVector::new(&data.schema, vec![-1.5, 0.5]);
        let out = predictor.predict(PredictorInput::Features(&buy)).unwrap();
        assert_eq!(out.probabilities.argmax(), Label::Buy);
        assert!((out.probabilities.sum() - 1.0).abs() < 1e-9);
        let out = predictor.predict(PredictorInput::Features(&sell)).unwrap();
        assert_eq!(out.probabilities.argmax(), Label::Sell);
    }

    #[test]
    fn untrained_predict_fails() {
        let data = separable_dataset(10);
        let vector = FeatureVector::new(&data.schema, vec![0.0, 0.0]);
        let err = SoftmaxPredictor::default()
            .predict(PredictorInput::Features(&vector))
            .unwrap_err();
        assert!(matches!(err, PredictorError::NotTrained(_)));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let data = separable_dataset(60);
        let mut predictor = SoftmaxPredictor::default();
        predictor.train(&data, None, &options()).unwrap();

        let other = FeatureSchema::new(vec!["a".into(), "b".into()]);
        let vector = FeatureVector::new(&other, vec![0.0, 0.0]);
        let err = predictor.predict(PredictorInput::Features(&vector)).unwrap_err();
        assert!(matches!(err, PredictorError::SchemaMismatch { .. }));
    }

    #[test]
    fn window_input_is_unsupported() {
        let err = SoftmaxPredictor::default()
            .predict(PredictorInput::Window(&[]))
            .unwrap_err();
        assert!(matches!(err, PredictorError::UnsupportedInput { .. }));
    }

    #[test]
    fn validation_history_is_recorded() {
        let data = separable_dataset(200);
        let train = data.within(0..150);
        let val = data.within(150..200);
        let mut predictor = SoftmaxPredictor::default();
        let opts = TrainOptions {
            epochs: 30,
            patience: 5,
            ..TrainOptions::default()
        };
        let history = predictor.train(&train, Some(&val), &opts).unwrap();
        assert_eq!(history.val_loss.len(), history.epochs_run());
        assert!(history.epochs_run() <= 30);
    }

    #[test]
    fn save_load_round_trip() {
        let data = separable_dataset(120);
        let mut predictor = SoftmaxPredictor::default();
        predictor.train(&data, None, &options()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        predictor.save(dir.path()).unwrap();
        let mut restored = SoftmaxPredictor::default();
        restored.load(dir.path()).unwrap();

        let vector = FeatureVector::new(&data.schema, vec![0.3, 0.2]);
        let a = predictor.predict(PredictorInput::Features(&vector)).unwrap();
        let b = restored.predict(PredictorInput::Features(&vector)).unwrap();
        for k in 0..3 {
            assert!((a.probabilities.0[k] - b.probabilities.0[k]).abs() < 1e-12);
        }
    }

    #[test]
    fn too_few_samples() {
        let data = separable_dataset(1);
        let err = SoftmaxPredictor::default()
            .train(&data, None, &options())
            .unwrap_err();
        assert!(matches!(err, PredictorError::InsufficientData { .. }));
    }
}
