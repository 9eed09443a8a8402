//! Model artifact: a directory holding `manifest.json` and the classifier file.
//!
//! The manifest records the window table the classifier was trained with and
//! the feature names it expects, so serving validates requests against exactly
//! the columns the builder produced at training time.

use crate::config::FeaturesConfig;
use crate::error::{FeatureError, Result};
use crate::features::FeatureSchema;
use crate::transactions::TxType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

fn default_threshold() -> f32 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    /// Classifier file name, relative to the artifact directory
    pub model_file: PathBuf,
    /// Builder parameters used to produce the training features
    pub features: FeaturesConfig,
    /// Expected model input columns, in order
    pub feature_names: FeatureSchema,
    /// Category vocabulary seen at training time; serving rejects any other type
    pub type_categories: Vec<TxType>,
    /// Probability at or above which a record is predicted as fraud
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
}

impl ModelArtifact {
    /// Manifest for a classifier trained on features from `features`.
    pub fn new(version: impl Into<String>, model_file: impl Into<PathBuf>, features: FeaturesConfig) -> Self {
        let feature_names = FeatureSchema::from_windows(&features.windows);
        Self {
            version: version.into(),
            model_file: model_file.into(),
            features,
            feature_names,
            type_categories: TxType::ALL.to_vec(),
            threshold: default_threshold(),
            trained_at: None,
        }
    }

    /// Read and check the manifest in `dir`. Fails if the directory or manifest
    /// is absent, or if the stored feature list disagrees with what the stored
    /// window table produces.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = dir.join(MANIFEST_FILE);
        if !manifest.exists() {
            return Err(FeatureError::ArtifactNotFound(manifest));
        }
        let data = std::fs::read_to_string(&manifest)?;
        let artifact: ModelArtifact = serde_json::from_str(&data)?;
        artifact.features.validate()?;
        artifact.expected_schema().ensure_matches(&artifact.feature_names)?;
        if artifact.type_categories.is_empty() {
            return Err(FeatureError::Config("type_categories is empty".into()));
        }
        if !(0.0..=1.0).contains(&artifact.threshold) {
            return Err(FeatureError::Config(format!(
                "threshold {} outside [0, 1]",
                artifact.threshold
            )));
        }
        info!(
            path = %manifest.display(),
            version = %artifact.version,
            features = artifact.feature_names.len(),
            "model manifest loaded"
        );
        Ok(artifact)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Schema the stored window table produces.
    pub fn expected_schema(&self) -> FeatureSchema {
        FeatureSchema::from_windows(&self.features.windows)
    }

    pub fn model_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.model_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Aggregate, WindowSpec};

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = ModelArtifact::new("0.1.0", "model.onnx", FeaturesConfig::default());
        artifact.trained_at = Some(Utc::now());
        artifact.threshold = 0.61;
        artifact.save(dir.path()).unwrap();
        let loaded = ModelArtifact::load(dir.path()).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.model_path(dir.path()), dir.path().join("model.onnx"));
    }

    #[test]
    fn missing_manifest_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelArtifact::load(dir.path()),
            Err(FeatureError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn edited_window_table_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = ModelArtifact::new("0.1.0", "model.onnx", FeaturesConfig::default());
        artifact.features.windows = vec![
            WindowSpec::new(6, [Aggregate::Count]),
            WindowSpec::new(24, [Aggregate::Sum]),
        ];
        artifact.save(dir.path()).unwrap();
        match ModelArtifact::load(dir.path()) {
            Err(FeatureError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["tx_sum_amount_24h".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_type_vocabulary_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = ModelArtifact::new("0.1.0", "model.onnx", FeaturesConfig::default());
        artifact.type_categories.clear();
        artifact.save(dir.path()).unwrap();
        assert!(matches!(
            ModelArtifact::load(dir.path()),
            Err(FeatureError::Config(ref m)) if m.contains("type_categories")
        ));
    }

    #[test]
    fn threshold_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact::new("0.1.0", "model.onnx", FeaturesConfig::default());
        let mut json = serde_json::to_value(&artifact).unwrap();
        json.as_object_mut().unwrap().remove("threshold");
        std::fs::write(dir.path().join(MANIFEST_FILE), json.to_string()).unwrap();
        assert_eq!(ModelArtifact::load(dir.path()).unwrap().threshold, 0.5);
    }
}
