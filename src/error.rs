//! Error types shared by the builder, loader, artifact and serving layers.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// A malformed or missing field in one transaction record.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("invalid {field} {value:?}{}: {reason}", record_suffix(.record))]
pub struct ValidationError {
    /// Position of the record in the input batch, when known
    pub record: Option<usize>,
    pub field: String,
    pub value: String,
    pub reason: String,
}

fn record_suffix(record: &Option<usize>) -> String {
    record.map(|r| format!(" (record {r})")).unwrap_or_default()
}

impl ValidationError {
    pub fn new(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record: None,
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn at(mut self, record: usize) -> Self {
        self.record = Some(record);
        self
    }
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("schema mismatch: missing features {missing:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("computation error for account {account_id} at hour {timestamp_hours}: {reason}")]
    Computation {
        account_id: String,
        timestamp_hours: u32,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine-readable error body for clients of the serving boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
}

impl FeatureError {
    /// Short stable identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureError::Validation(_) => "validation_error",
            FeatureError::SchemaMismatch { .. } => "schema_mismatch",
            FeatureError::Computation { .. } => "computation_error",
            FeatureError::Config(_) => "config_error",
            FeatureError::ArtifactNotFound(_) => "artifact_not_found",
            FeatureError::Model(_) => "model_error",
            FeatureError::Io(_) => "io_error",
            FeatureError::Csv(_) => "csv_error",
            FeatureError::Json(_) => "json_error",
        }
    }

    /// True when the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FeatureError::Validation(_) | FeatureError::SchemaMismatch { .. }
        )
    }

    pub fn detail(&self) -> ErrorDetail {
        let mut detail = ErrorDetail {
            kind: self.kind(),
            message: self.to_string(),
            missing_features: None,
            expected_features: None,
            received_columns: None,
            field: None,
            value: None,
            record: None,
        };
        match self {
            FeatureError::Validation(v) => {
                detail.field = Some(v.field.clone());
                detail.value = Some(v.value.clone());
                detail.record = v.record;
            }
            FeatureError::SchemaMismatch {
                missing,
                expected,
                received,
            } => {
                detail.message = "Missing required features".to_string();
                detail.missing_features = Some(missing.clone());
                detail.expected_features = Some(expected.clone());
                detail.received_columns = Some(received.clone());
            }
            _ => {}
        }
        detail
    }
}
