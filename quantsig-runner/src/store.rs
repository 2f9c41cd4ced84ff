//! Model store: immutable, versioned ensemble artifacts on disk.
//!
//! Layout of one version:
//! ```text
//! <root>/<tag>/manifest.json          ModelManifest
//! <root>/<tag>/samples.json           training samples (replayed later)
//! <root>/<tag>/<predictor>/model.json one directory per predictor
//! ```
//!
//! Tags are `<kind>_<YYYYmmdd_HHMMSS>_<hash8>` where the hash is BLAKE3 over
//! the manifest. A version directory is written once and never modified.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use quantsig_core::features::{Dataset, FeatureConfig, FeatureSchema};
use quantsig_core::regime::Regime;

use crate::fusion::EnsembleWeights;
use crate::overfitting::FoldVerdict;
use crate::predictor::{Predictor, PredictorError, PredictorKind};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SAMPLES_FILE: &str = "samples.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model version not found: {0}")]
    NotFound(String),
    #[error("model version already exists: {0}")]
    AlreadyExists(String),
    #[error("manifest lists unknown predictor {0}")]
    UnknownPredictor(String),
    #[error("predictor {name}: {source}")]
    Predictor {
        name: String,
        #[source]
        source: PredictorError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ─── Manifest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    Full,
    Incremental,
}

impl VersionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionKind::Full => "full",
            VersionKind::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorRecord {
    pub name: String,
    pub kind: PredictorKind,
}

/// What a training run reports alongside the artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub symbols: Vec<String>,
    pub samples_used: usize,
    pub epochs: usize,
    pub folds: usize,
    pub overfit_folds: usize,
    pub regimes: Vec<(String, Regime)>,
    pub verdicts: Vec<FoldVerdict>,
    /// Replayed sample count for incremental versions.
    pub replayed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Assigned by the store on save; empty before.
    #[serde(default)]
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub kind: VersionKind,
    pub parent: Option<String>,
    pub predictors: Vec<PredictorRecord>,
    pub weights: EnsembleWeights,
    pub schema: FeatureSchema,
    pub feature_config: FeatureConfig,
    pub feature_importance: Option<Vec<(String, f64)>>,
    pub summary: TrainingSummary,
}

impl ModelManifest {
    /// `<kind>_<timestamp>_<hash8>` for this manifest's content.
    pub fn derive_tag(&self) -> Result<String, StoreError> {
        let mut unnamed = self.clone();
        unnamed.tag.clear();
        let json = serde_json::to_vec(&unnamed)?;
        let hash = blake3::hash(&json).to_hex();
        Ok(format!(
            "{}_{}_{}",
            self.kind.as_str(),
            self.created_at.format("%Y%m%d_%H%M%S"),
            &hash[..8]
        ))
    }
}

/// A complete ensemble version: manifest, trained predictors and the
/// samples they were trained on.
pub struct ModelArtifacts {
    pub manifest: ModelManifest,
    pub predictors: Vec<Box<dyn Predictor>>,
    pub samples: Dataset,
}

impl std::fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.predictors.iter().map(|p| p.name()).collect();
        f.debug_struct("ModelArtifacts")
            .field("manifest", &self.manifest)
            .field("predictors", &names)
            .field("samples", &self.samples.len())
            .finish()
    }
}

// ─── Store ───────────────────────────────────────────────────────────

pub trait ModelStore: Send + Sync {
    /// Persist `artifacts` and return the assigned version tag.
    fn save_version(&self, artifacts: &ModelArtifacts) -> Result<String, StoreError>;

    fn load_version(&self, tag: &str) -> Result<ModelArtifacts, StoreError>;

    /// Tags ordered oldest → newest.
    fn list_versions(&self) -> Result<Vec<String>, StoreError>;

    fn latest_version(&self) -> Result<Option<String>, StoreError> {
        Ok(self.list_versions()?.pop())
    }
}

/// Directory-backed [`ModelStore`].
#[derive(Debug, Clone)]
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }

    fn read_manifest(&self, dir: &Path) -> Result<ModelManifest, StoreError> {
        let json = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl ModelStore for FsModelStore {
    fn save_version(&self, artifacts: &ModelArtifacts) -> Result<String, StoreError> {
        let tag = artifacts.manifest.derive_tag()?;
        let dir = self.version_dir(&tag);
        if dir.exists() {
            return Err(StoreError::AlreadyExists(tag));
        }
        fs::create_dir_all(&dir)?;

        for predictor in &artifacts.predictors {
            predictor
                .save(&dir.join(predictor.name()))
                .map_err(|source| StoreError::Predictor {
                    name: predictor.name().to_string(),
                    source,
                })?;
        }
        fs::write(
            dir.join(SAMPLES_FILE),
            serde_json::to_string(&artifacts.samples)?,
        )?;

        // Manifest last: a directory without one is an incomplete write.
        let mut manifest = artifacts.manifest.clone();
        manifest.tag = tag.clone();
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        info!(tag = %tag, predictors = artifacts.predictors.len(), "saved model version");
        Ok(tag)
    }

    fn load_version(&self, tag: &str) -> Result<ModelArtifacts, StoreError> {
        let dir = self.version_dir(tag);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(StoreError::NotFound(tag.to_string()));
        }
        let manifest = self.read_manifest(&dir)?;

        let mut predictors = Vec::with_capacity(manifest.predictors.len());
        for record in &manifest.predictors {
            let mut predictor = record.kind.create();
            if predictor.name() != record.name {
                return Err(StoreError::UnknownPredictor(record.name.clone()));
            }
            predictor
                .load(&dir.join(&record.name))
                .map_err(|source| StoreError::Predictor {
                    name: record.name.clone(),
                    source,
                })?;
            predictors.push(predictor);
        }

        let samples: Dataset = serde_json::from_str(&fs::read_to_string(dir.join(SAMPLES_FILE))?)?;
        Ok(ModelArtifacts {
            manifest,
            predictors,
            samples,
        })
    }

    fn list_versions(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.join(MANIFEST_FILE).is_file() {
                continue;
            }
            let manifest = self.read_manifest(&path)?;
            versions.push((manifest.created_at, manifest.tag));
        }
        versions.sort();
        Ok(versions.into_iter().map(|(_, tag)| tag).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manifest(second: u32) -> ModelManifest {
        ModelManifest {
            tag: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap(),
            kind: VersionKind::Full,
            parent: None,
            predictors: vec![PredictorRecord {
                name: "pattern".into(),
                kind: PredictorKind::Pattern,
            }],
            weights: EnsembleWeights::default(),
            schema: FeatureSchema::new(vec!["pattern_doji".into()]),
            feature_config: FeatureConfig::default(),
            feature_importance: None,
            summary: TrainingSummary::default(),
        }
    }

    fn artifacts(second: u32) -> ModelArtifacts {
        let m = manifest(second);
        let samples = Dataset::new(m.schema.clone());
        ModelArtifacts {
            manifest: m,
            predictors: vec![PredictorKind::Pattern.create()],
            samples,
        }
    }

    #[test]
    fn tag_shape() {
        let tag = manifest(5).derive_tag().unwrap();
        assert!(tag.starts_with("full_20240301_120005_"), "{tag}");
        assert_eq!(tag.len(), "full_20240301_120005_".len() + 8);
    }

    #[test]
    fn tag_ignores_existing_tag_field() {
        let mut m = manifest(5);
        let before = m.derive_tag().unwrap();
        m.tag = before.clone();
        assert_eq!(m.derive_tag().unwrap(), before);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let tag = store.save_version(&artifacts(1)).unwrap();

        let loaded = store.load_version(&tag).unwrap();
        assert_eq!(loaded.manifest.tag, tag);
        assert_eq!(loaded.predictors.len(), 1);
        assert_eq!(loaded.predictors[0].name(), "pattern");
        assert!(dir.path().join(&tag).join("pattern").join("model.json").is_file());
    }

    #[test]
    fn versions_listed_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let newer = store.save_version(&artifacts(30)).unwrap();
        let older = store.save_version(&artifacts(10)).unwrap();
        assert_eq!(store.list_versions().unwrap(), vec![older, newer.clone()]);
        assert_eq!(store.latest_version().unwrap(), Some(newer));
    }

    #[test]
    fn duplicate_save_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        store.save_version(&artifacts(1)).unwrap();
        assert!(matches!(
            store.save_version(&artifacts(1)),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path().join("absent"));
        assert!(store.list_versions().unwrap().is_empty());
        assert!(matches!(
            store.load_version("full_x"),
            Err(StoreError::NotFound(_))
        ));
    }
}
