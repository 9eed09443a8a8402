//! Fraud features: per-account temporal features for transaction fraud detection.
//!
//! Modular structure:
//! - [`transactions`]: Transaction records and the delimited-file loader
//! - [`features`]: Trailing-window temporal feature builder and feature schema
//! - [`split`]: Stratified train/validation/test split
//! - [`export`]: Enriched dataset and feature manifest writers
//! - [`model`]: Classifier seam, ONNX inference and model artifact
//! - [`serving`]: Immutable model context for batch prediction
//! - [`logging`]: Structured JSON logging

pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod logging;
pub mod model;
pub mod serving;
pub mod split;
pub mod transactions;

pub use config::AppConfig;
pub use error::{FeatureError, Result, ValidationError};
pub use features::{BuildOutput, EnrichedTransaction, FeatureSchema, TemporalFeatureBuilder};
pub use logging::StructuredLogger;
pub use model::{Classifier, ModelArtifact, OnnxClassifier};
pub use serving::{ModelContext, PredictRequest, PredictResponse};
pub use transactions::{RawTransaction, Transaction, TxType};
