//! Rule-based predictor over candlestick pattern flags.
//!
//! The active patterns at a bar vote by [`Bias`]: more bullish than bearish
//! flags reads bullish, the reverse reads bearish, anything else neutral.
//! Untrained, each reading maps to a fixed vector:
//! - bullish → [0.1, 0.2, 0.7]
//! - bearish → [0.7, 0.2, 0.1]
//! - neutral → [0.33, 0.34, 0.33]
//!
//! Training replaces the fixed vectors with Laplace-smoothed class
//! frequencies per reading. Accepts feature vectors (reads the
//! `pattern_*` columns) or raw bar windows (runs the detector on the last
//! bar).

use std::path::Path;

use serde::{Deserialize, Serialize};

use quantsig_core::domain::{Bar, ClassProbabilities, NO_SIGNAL};
use quantsig_core::features::{Dataset, FeatureSchema};
use quantsig_core::patterns::{Bias, PatternConfig, PatternDetector, PatternKind};

use super::{
    read_model, write_model, Predictor, PredictorError, PredictorInput, PredictorKind,
    PredictorOutput, TrainOptions, TrainingHistory,
};

pub const BULLISH_VECTOR: [f64; 3] = [0.1, 0.2, 0.7];
pub const BEARISH_VECTOR: [f64; 3] = [0.7, 0.2, 0.1];

/// Net reading of the active patterns at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    Bullish,
    Bearish,
    Neutral,
}

impl Reading {
    fn index(self) -> usize {
        match self {
            Reading::Bullish => 0,
            Reading::Bearish => 1,
            Reading::Neutral => 2,
        }
    }

    pub fn from_patterns(active: impl IntoIterator<Item = PatternKind>) -> Reading {
        let mut net = 0i32;
        for kind in active {
            match kind.bias() {
                Bias::Bullish => net += 1,
                Bias::Bearish => net -= 1,
                Bias::Neutral => {}
            }
        }
        match net {
            n if n > 0 => Reading::Bullish,
            n if n < 0 => Reading::Bearish,
            _ => Reading::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PatternModel {
    /// Schema seen in training; `None` for the untrained rule table.
    schema: Option<FeatureSchema>,
    /// Class vector per reading, indexed by `Reading::index`.
    table: [[f64; 3]; 3],
    /// Thresholds for raw-window detection.
    #[serde(default)]
    patterns: PatternConfig,
}

impl Default for PatternModel {
    fn default() -> Self {
        Self {
            schema: None,
            table: [BULLISH_VECTOR, BEARISH_VECTOR, NO_SIGNAL],
            patterns: PatternConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternPredictor {
    detector: PatternDetector,
    model: PatternModel,
}

impl PatternPredictor {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            detector: PatternDetector::new(config.clone()),
            model: PatternModel {
                patterns: config,
                ..PatternModel::default()
            },
        }
    }

    /// Reading from the `pattern_*` columns of a feature row.
    fn reading_from_features(schema: &FeatureSchema, values: &[f64]) -> Reading {
        let active = PatternKind::ALL.into_iter().filter(|kind| {
            schema
                .index_of(&kind.feature_name())
                .and_then(|i| values.get(i))
                .is_some_and(|&v| v > 0.5)
        });
        Reading::from_patterns(active)
    }

    fn reading_from_window(&self, bars: &[Bar]) -> Result<Reading, PredictorError> {
        let Some(last) = bars.len().checked_sub(1) else {
            return Err(PredictorError::InsufficientData {
                needed: 1,
                available: 0,
            });
        };
        let flags = self.detector.detect_all(bars, last);
        Ok(Reading::from_patterns(
            flags.into_iter().filter_map(|(kind, on)| on.then_some(kind)),
        ))
    }

    fn output(&self, reading: Reading) -> PredictorOutput {
        PredictorOutput::from_probabilities(ClassProbabilities::from_scores(
            self.model.table[reading.index()],
        ))
    }
}

fn has_pattern_columns(schema: &FeatureSchema) -> bool {
    PatternKind::ALL
        .iter()
        .any(|kind| schema.index_of(&kind.feature_name()).is_some())
}

impl Predictor for PatternPredictor {
    fn name(&self) -> &str {
        PredictorKind::Pattern.name()
    }

    fn kind(&self) -> PredictorKind {
        PredictorKind::Pattern
    }

    fn train(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory, PredictorError> {
        if !has_pattern_columns(&train.schema) {
            return Err(PredictorError::Training(
                "feature schema has no pattern columns".into(),
            ));
        }
        let mut counts = [[1.0_f64; 3]; 3];
        for sample in &train.samples {
            let reading = Self::reading_from_features(&train.schema, &sample.features);
            counts[reading.index()][sample.label.index()] += 1.0;
        }
        let mut table = [[0.0; 3]; 3];
        for (row, count) in table.iter_mut().zip(counts) {
            *row = ClassProbabilities::from_scores(count).0;
        }
        let patterns = options
            .patterns
            .clone()
            .unwrap_or_else(|| self.model.patterns.clone());
        self.detector = PatternDetector::new(patterns.clone());
        self.model = PatternModel {
            schema: Some(train.schema.clone()),
            table,
            patterns,
        };

        let mut history = TrainingHistory::default();
        history.push_train(self.evaluate(train)?);
        if let Some(val) = validation.filter(|v| !v.is_empty()) {
            history.push_val(self.evaluate(val)?);
        }
        Ok(history)
    }

    fn predict(&self, input: PredictorInput<'_>) -> Result<PredictorOutput, PredictorError> {
        match input {
            PredictorInput::Features(vector) => {
                let reading = match &self.model.schema {
                    Some(schema) => {
                        schema.check(vector)?;
                        Self::reading_from_features(schema, &vector.values)
                    }
                    None => {
                        return Err(PredictorError::NotTrained(self.name().to_string()));
                    }
                };
                Ok(self.output(reading))
            }
            PredictorInput::Window(bars) => Ok(self.output(self.reading_from_window(bars)?)),
        }
    }

    fn save(&self, dir: &Path) -> Result<(), PredictorError> {
        write_model(dir, &self.model)
    }

    fn load(&mut self, dir: &Path) -> Result<(), PredictorError> {
        self.model = read_model(dir)?;
        self.detector = PatternDetector::new(self.model.patterns.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quantsig_core::domain::Label;
    use quantsig_core::features::{FeatureVector, LabeledSample};

    fn bar(open: f64, high: f64, low: f64, close: f64, day: u32) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            "rsi_14".into(),
            PatternKind::BullishEngulfing.feature_name(),
            PatternKind::BearishEngulfing.feature_name(),
            PatternKind::Doji.feature_name(),
        ])
    }

    #[test]
    fn readings_follow_bias_votes() {
        assert_eq!(
            Reading::from_patterns([PatternKind::BullishEngulfing, PatternKind::Hammer]),
            Reading::Bullish
        );
        assert_eq!(
            Reading::from_patterns([PatternKind::BullishEngulfing, PatternKind::BearishEngulfing]),
            Reading::Neutral
        );
        assert_eq!(
            Reading::from_patterns([PatternKind::EveningStar]),
            Reading::Bearish
        );
        assert_eq!(Reading::from_patterns([]), Reading::Neutral);
    }

    #[test]
    fn window_engulfing_reads_bullish() {
        let bars = vec![bar(105.0, 106.0, 99.0, 100.0, 2), bar(99.0, 108.0, 98.0, 107.0, 3)];
        let out = PatternPredictor::default()
            .predict(PredictorInput::Window(&bars))
            .unwrap();
        for (p, expected) in out.probabilities.0.iter().zip(BULLISH_VECTOR) {
            assert!((p - expected).abs() < 1e-12);
        }
        assert!((out.confidence.unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn empty_window_is_insufficient() {
        let err = PatternPredictor::default()
            .predict(PredictorInput::Window(&[]))
            .unwrap_err();
        assert!(matches!(err, PredictorError::InsufficientData { .. }));
    }

    #[test]
    fn trained_table_reflects_frequencies() {
        let schema = schema();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let samples = (0..20)
            .map(|i| LabeledSample {
                bar_index: i,
                timestamp: day,
                features: vec![50.0, 1.0, 0.0, 0.0],
                label: if i < 18 { Label::Buy } else { Label::Sell },
            })
            .collect();
        let data = Dataset {
            schema: schema.clone(),
            samples,
        };
        let mut predictor = PatternPredictor::default();
        let history = predictor
            .train(&data, None, &TrainOptions::default())
            .unwrap();
        assert_eq!(history.epochs_run(), 1);

        let vector = FeatureVector::new(&schema, vec![40.0, 1.0, 0.0, 0.0]);
        let out = predictor.predict(PredictorInput::Features(&vector)).unwrap();
        // (1 + 2) / 23 SELL, 1 / 23 HOLD, (1 + 18) / 23 BUY
        assert!((out.probabilities.0[2] - 19.0 / 23.0).abs() < 1e-12);
        assert!((out.probabilities.0[0] - 3.0 / 23.0).abs() < 1e-12);
    }

    fn pattern_dataset(n: usize) -> Dataset {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Dataset {
            schema: schema(),
            samples: (0..n)
                .map(|i| LabeledSample {
                    bar_index: i,
                    timestamp: day,
                    features: vec![50.0, 0.0, 0.0, 0.0],
                    label: Label::Hold,
                })
                .collect(),
        }
    }

    #[test]
    fn trained_thresholds_drive_window_readings() {
        // The last close clears the two prior highs: a breakout only with
        // a two-bar lookback.
        let bars = vec![
            bar(100.0, 101.0, 99.0, 100.5, 2),
            bar(100.0, 101.0, 99.5, 100.6, 3),
            bar(100.0, 103.0, 99.8, 102.8, 4),
        ];
        let short = PatternConfig {
            breakout_lookback: 2,
            ..PatternConfig::default()
        };
        let options = TrainOptions {
            patterns: Some(short.clone()),
            ..TrainOptions::default()
        };
        let mut tuned = PatternPredictor::default();
        tuned.train(&pattern_dataset(10), None, &options).unwrap();
        let mut stock = PatternPredictor::default();
        stock
            .train(&pattern_dataset(10), None, &TrainOptions::default())
            .unwrap();

        // All training rows read neutral with a HOLD label.
        let tuned_out = tuned.predict(PredictorInput::Window(&bars)).unwrap();
        let stock_out = stock.predict(PredictorInput::Window(&bars)).unwrap();
        assert!((tuned_out.probabilities.0[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((stock_out.probabilities.0[1] - 11.0 / 13.0).abs() < 1e-12);

        let dir = tempfile::tempdir().unwrap();
        tuned.save(dir.path()).unwrap();
        let mut restored = PatternPredictor::default();
        restored.load(dir.path()).unwrap();
        assert_eq!(restored.detector.config(), &short);
        let restored_out = restored.predict(PredictorInput::Window(&bars)).unwrap();
        assert_eq!(restored_out.probabilities, tuned_out.probabilities);
    }

    #[test]
    fn schema_without_patterns_cannot_train() {
        let data = Dataset::new(FeatureSchema::new(vec!["rsi_14".into()]));
        let err = PatternPredictor::default()
            .train(&data, None, &TrainOptions::default())
            .unwrap_err();
        assert!(matches!(err, PredictorError::Training(_)));
    }

    #[test]
    fn save_load_keeps_table() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = PatternPredictor::default();
        predictor.save(dir.path()).unwrap();
        let mut restored = PatternPredictor::default();
        restored.load(dir.path()).unwrap();
        assert_eq!(restored.model, predictor.model);
    }
}
