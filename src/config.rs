//! Job and service configuration. Loaded from a JSON file; every section has defaults.

use crate::error::{FeatureError, Result};
use crate::features::{Aggregate, WindowSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Delimited transaction file (PaySim layout)
    pub data_path: PathBuf,
    /// Directory for enriched train/val/test files and the feature manifest
    pub output_dir: PathBuf,
    /// Temporal feature builder parameters
    pub features: FeaturesConfig,
    /// Dataset split
    pub split: SplitConfig,
    /// Optional scoring with a trained artifact
    pub model: ModelConfig,
    /// Logging
    pub log: LogConfig,
}

/// What the builder does with a record that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRecordPolicy {
    /// Fail the whole batch on the first invalid record
    #[default]
    RejectBatch,
    /// Exclude the record and return its error to the caller
    RejectRecord,
}

/// Visibility of rows sharing an account and timestamp inside each other's windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieVisibility {
    /// A row sees the tied rows that precede it in input order, and itself
    #[default]
    Prefix,
    /// Every row of a tie group sees the whole group
    Group,
}

/// Total order of the builder's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrder {
    /// `(account_id, timestamp_hours, input_index)`
    #[default]
    AccountTime,
    /// Original input position
    Input,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Window table: width in hours and the aggregates computed for it
    pub windows: Vec<WindowSpec>,
    pub invalid_records: InvalidRecordPolicy,
    pub ties: TieVisibility,
    pub output_order: OutputOrder,
    /// Scan account partitions on the rayon pool
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction held out from training
    pub test_size: f64,
    /// Share of the held-out part used for validation; the rest is test
    pub val_share: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Artifact directory (manifest.json + model file). Scoring is skipped when unset.
    pub artifact_dir: Option<PathBuf>,
    /// Include class-1 probabilities in responses
    pub return_proba: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/paysim.csv"),
            output_dir: PathBuf::from("out"),
            features: FeaturesConfig::default(),
            split: SplitConfig::default(),
            model: ModelConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                WindowSpec::new(2, [Aggregate::Count, Aggregate::Mean, Aggregate::Max]),
                WindowSpec::new(6, [Aggregate::Count, Aggregate::Sum]),
            ],
            invalid_records: InvalidRecordPolicy::default(),
            ties: TieVisibility::default(),
            output_order: OutputOrder::default(),
            parallel: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            return_proba: true,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.30,
            val_share: 0.50,
            seed: 21,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl FeaturesConfig {
    /// Reject window tables that would produce ambiguous or empty columns.
    pub fn validate(&self) -> Result<()> {
        let mut widths = HashSet::new();
        for w in &self.windows {
            if w.width_hours == 0 {
                return Err(FeatureError::Config("window width must be at least 1 hour".into()));
            }
            if !widths.insert(w.width_hours) {
                return Err(FeatureError::Config(format!(
                    "window width {}h listed more than once",
                    w.width_hours
                )));
            }
            if w.aggregates.is_empty() {
                return Err(FeatureError::Config(format!(
                    "window {}h has no aggregates",
                    w.width_hours
                )));
            }
            let unique: HashSet<Aggregate> = w.aggregates.iter().copied().collect();
            if unique.len() != w.aggregates.len() {
                return Err(FeatureError::Config(format!(
                    "window {}h repeats an aggregate",
                    w.width_hours
                )));
            }
        }
        Ok(())
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit(self.test_size) || !in_unit(self.val_share) {
            return Err(FeatureError::Config(
                "split fractions must lie strictly between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load from a JSON file if present, otherwise defaults. A file that exists
    /// but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&data)
            .map_err(|e| FeatureError::Config(format!("{}: {}", path.display(), e)))?;
        config.features.validate()?;
        config.split.validate()?;
        Ok(config)
    }
}
