//! Feature matrices and labelled datasets.

use std::ops::Range;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{FeatureError, FeatureSchema, FeatureVector};
use crate::domain::Label;

/// One bar's feature values. `label` is `None` for the last `lookahead` bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub values: Vec<f64>,
    pub label: Option<Label>,
}

/// Builder output: every bar with a complete feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature vector of the last row, if any.
    pub fn latest(&self) -> Option<FeatureVector> {
        self.rows
            .last()
            .map(|row| FeatureVector::new(&self.schema, row.values.clone()))
    }

    /// Keep the labelled rows only.
    pub fn into_dataset(self) -> Dataset {
        let samples = self
            .rows
            .into_iter()
            .filter_map(|row| {
                Some(LabeledSample {
                    bar_index: row.bar_index,
                    timestamp: row.timestamp,
                    label: row.label?,
                    features: row.values,
                })
            })
            .collect();
        Dataset {
            schema: self.schema,
            samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    /// Index of the bar in the series the sample was built from.
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub features: Vec<f64>,
    pub label: Label,
}

/// Labelled samples under one schema, in bar order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: FeatureSchema,
    pub samples: Vec<LabeledSample>,
}

impl Dataset {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Sample counts indexed by [`Label::index`].
    pub fn class_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for s in &self.samples {
            counts[s.label.index()] += 1;
        }
        counts
    }

    /// Samples whose bar index lies in `bars`.
    pub fn within(&self, bars: Range<usize>) -> Dataset {
        self.filtered(|s| bars.contains(&s.bar_index))
    }

    pub fn filtered(&self, keep: impl Fn(&LabeledSample) -> bool) -> Dataset {
        Dataset {
            schema: self.schema.clone(),
            samples: self.samples.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// The last `n` samples (all of them when fewer exist).
    pub fn tail(&self, n: usize) -> Dataset {
        let start = self.samples.len().saturating_sub(n);
        Dataset {
            schema: self.schema.clone(),
            samples: self.samples[start..].to_vec(),
        }
    }

    /// Append another dataset built under the same schema.
    pub fn extend(&mut self, other: Dataset) -> Result<(), FeatureError> {
        if other.schema.id() != self.schema.id() {
            return Err(FeatureError::SchemaMismatch {
                expected: self.schema.id().to_string(),
                actual: other.schema.id().to_string(),
            });
        }
        self.samples.extend(other.samples);
        Ok(())
    }
}
