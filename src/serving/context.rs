//! Loaded classifier plus the artifact metadata needed to validate requests.
//!
//! Each request is scored on its own records only; nothing is carried from one
//! request to the next.

use crate::config::{InvalidRecordPolicy, OutputOrder};
use crate::error::{FeatureError, Result, ValidationError};
use crate::features::{check_category, EnrichedTransaction, FeatureMatrix, FeatureSchema, TemporalFeatureBuilder};
use crate::model::{Classifier, ModelArtifact, OnnxClassifier};
use crate::transactions::RawTransaction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// A batch of `{field: value}` records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub records: Vec<Map<String, Value>>,
    /// Records are raw transactions; derive features with the artifact's window table
    #[serde(default)]
    pub recompute: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// 1 = fraud, 0 = legitimate; one per request record, in request order
    pub predictions: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub inference_ms: f64,
}

pub struct ModelContext {
    classifier: Box<dyn Classifier>,
    artifact: ModelArtifact,
    builder: TemporalFeatureBuilder,
}

impl ModelContext {
    /// Load manifest and classifier from an artifact directory. Any missing
    /// file or inconsistent manifest fails here rather than on first request.
    pub fn load(dir: &Path, intra_threads: usize) -> Result<Self> {
        let artifact = ModelArtifact::load(dir)?;
        let classifier = OnnxClassifier::load(
            &artifact.model_path(dir),
            artifact.feature_names.len(),
            intra_threads,
        )?;
        let ctx = Self::from_parts(artifact, Box::new(classifier))?;
        info!(
            dir = %dir.display(),
            version = %ctx.artifact.version,
            classifier = ctx.classifier.name(),
            "model context ready"
        );
        Ok(ctx)
    }

    /// Assemble a context around any classifier.
    pub fn from_parts(artifact: ModelArtifact, classifier: Box<dyn Classifier>) -> Result<Self> {
        let mut features = artifact.features.clone();
        // one prediction per request record, in request order
        features.output_order = OutputOrder::Input;
        features.invalid_records = InvalidRecordPolicy::RejectBatch;
        let builder = TemporalFeatureBuilder::new(features)?;
        builder.schema().ensure_matches(&artifact.feature_names)?;
        Ok(Self {
            classifier,
            artifact,
            builder,
        })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.artifact.feature_names
    }

    pub fn version(&self) -> &str {
        &self.artifact.version
    }

    pub fn threshold(&self) -> f32 {
        self.artifact.threshold
    }

    pub fn predict(&self, request: &PredictRequest, return_proba: bool) -> Result<PredictResponse> {
        if request.recompute {
            let raw: Vec<RawTransaction> = request.records.iter().map(RawTransaction::from_record).collect();
            self.predict_transactions(&raw, return_proba)
        } else {
            self.predict_records(&request.records, return_proba)
        }
    }

    /// Score records that already carry every feature the model expects.
    /// Extra fields are dropped.
    pub fn predict_records(&self, records: &[Map<String, Value>], return_proba: bool) -> Result<PredictResponse> {
        let started = Instant::now();
        ensure_non_empty(records.len())?;
        let matrix = self.schema().records_matrix(records, &self.artifact.type_categories)?;
        self.score(&matrix, return_proba, started)
    }

    /// Score raw transactions, deriving their features from the other records
    /// in the same batch.
    pub fn predict_transactions(&self, records: &[RawTransaction], return_proba: bool) -> Result<PredictResponse> {
        let started = Instant::now();
        ensure_non_empty(records.len())?;
        let built = self.builder.build_raw(records)?;
        self.check_categories(&built.rows)?;
        let matrix = self.builder.schema().matrix(&built.rows)?;
        self.score(&matrix, return_proba, started)
    }

    /// Score rows already enriched by a builder with the artifact's window table.
    pub fn predict_enriched(&self, rows: &[EnrichedTransaction], return_proba: bool) -> Result<PredictResponse> {
        let started = Instant::now();
        ensure_non_empty(rows.len())?;
        self.check_categories(rows)?;
        let matrix = self.schema().matrix(rows)?;
        self.score(&matrix, return_proba, started)
    }

    /// Error on the first row whose type the model was not trained on.
    fn check_categories(&self, rows: &[EnrichedTransaction]) -> Result<()> {
        for row in rows {
            check_category(row.transaction.tx_type, &self.artifact.type_categories)
                .map_err(|e| e.at(row.input_index))?;
        }
        Ok(())
    }

    fn score(&self, matrix: &FeatureMatrix, return_proba: bool, started: Instant) -> Result<PredictResponse> {
        let probabilities = self.classifier.predict_proba(matrix)?;
        if probabilities.len() != matrix.nrows() {
            return Err(FeatureError::Model(format!(
                "classifier returned {} probabilities for {} records",
                probabilities.len(),
                matrix.nrows()
            )));
        }
        let threshold = self.threshold();
        let predictions = probabilities.iter().map(|p| u8::from(*p >= threshold)).collect();
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(records = matrix.nrows(), inference_ms, "batch scored");

        Ok(PredictResponse {
            predictions,
            probabilities: return_proba.then_some(probabilities),
            model_version: Some(self.artifact.version.clone()),
            inference_ms,
        })
    }
}

fn ensure_non_empty(len: usize) -> Result<()> {
    if len == 0 {
        return Err(ValidationError::new("records", "[]", "at least one record is required").into());
    }
    Ok(())
}
