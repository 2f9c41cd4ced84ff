//! Ordered feature names and the vectors tagged with them.

use serde::{Deserialize, Serialize};

use super::FeatureError;

/// Ordered list of feature names with a content id.
///
/// The id is the BLAKE3 hash of the names in order; two schemas are
/// interchangeable exactly when their ids match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    id: String,
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for name in &names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        let id = hasher.finalize().to_hex()[..16].to_string();
        Self { id, names }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Fails unless `vector` was produced under this schema.
    pub fn check(&self, vector: &FeatureVector) -> Result<(), FeatureError> {
        if vector.schema_id != self.id || vector.values.len() != self.names.len() {
            return Err(FeatureError::SchemaMismatch {
                expected: format!("{} ({} features)", self.id, self.names.len()),
                actual: format!("{} ({} features)", vector.schema_id, vector.values.len()),
            });
        }
        Ok(())
    }

    /// Wrap caller-supplied values, rejecting a wrong width or any
    /// non-finite entry.
    pub fn vector(&self, values: Vec<f64>) -> Result<FeatureVector, FeatureError> {
        if values.len() != self.names.len() {
            return Err(FeatureError::SchemaMismatch {
                expected: format!("{} features", self.names.len()),
                actual: format!("{} features", values.len()),
            });
        }
        if let Some((name, &value)) = self.names.iter().zip(&values).find(|(_, v)| !v.is_finite()) {
            return Err(FeatureError::NonFinite {
                feature: name.clone(),
                value,
            });
        }
        Ok(FeatureVector::new(self, values))
    }
}

/// Feature values for one bar, tagged with the id of their schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema_id: String,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(schema: &FeatureSchema, values: Vec<f64>) -> Self {
        Self {
            schema_id: schema.id().to_string(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
