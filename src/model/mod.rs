//! Fraud classifier seam and its persisted artifact.

mod artifact;
mod onnx;

pub use artifact::{ModelArtifact, MANIFEST_FILE};
pub use onnx::OnnxClassifier;

use crate::error::Result;
use crate::features::FeatureMatrix;

/// A trained binary classifier over the feature schema's columns.
pub trait Classifier: Send + Sync {
    /// Class-1 probability for every row of `features`.
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}
