//! ONNX Runtime classifier. Input: `[rows, features]` f32; output: class
//! probabilities (`[rows, 2]`, `[rows, 1]` or `[rows]`).

use super::Classifier;
use crate::error::{FeatureError, Result};
use crate::features::FeatureMatrix;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct OnnxClassifier {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    feature_dim: usize,
}

impl OnnxClassifier {
    pub fn load(path: &Path, feature_dim: usize, intra_threads: usize) -> Result<Self> {
        if !path.exists() {
            return Err(FeatureError::ArtifactNotFound(path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(model_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_err)?
            .with_intra_threads(intra_threads.max(1))
            .map_err(model_err)?
            .commit_from_file(path)
            .map_err(model_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());
        info!(model = %name, input = %input_name, output = %output_name, feature_dim, "ONNX classifier loaded");

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
            feature_dim,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f32>> {
        let (rows, cols) = features.dim();
        if cols != self.feature_dim {
            return Err(FeatureError::Model(format!(
                "model expects {} features, got {}",
                self.feature_dim, cols
            )));
        }
        if rows == 0 {
            return Ok(Vec::new());
        }

        let data: Vec<f32> = features.iter().copied().collect();
        let input = Tensor::from_array((vec![rows as i64, cols as i64], data)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| FeatureError::Model(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(model_err)?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| FeatureError::Model(format!("missing output {}", self.output_name)))?;
        let (shape, values) = output.try_extract_tensor::<f32>().map_err(model_err)?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        class_one_probabilities(&dims, values, rows)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn model_err(e: impl std::fmt::Display) -> FeatureError {
    FeatureError::Model(e.to_string())
}

fn class_one_probabilities(dims: &[i64], values: &[f32], rows: usize) -> Result<Vec<f32>> {
    let probs: Vec<f32> = match dims {
        [n, classes] if *n as usize == rows && *classes >= 2 => {
            let classes = *classes as usize;
            values.chunks(classes).map(|row| row[1]).collect()
        }
        [n, 1] if *n as usize == rows => values.to_vec(),
        [n] if *n as usize == rows => values.to_vec(),
        _ => {
            return Err(FeatureError::Model(format!(
                "unexpected probability shape {dims:?} for {rows} rows"
            )))
        }
    };
    Ok(probs.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_fails_fast() {
        let err = OnnxClassifier::load(Path::new("nonexistent.onnx"), 11, 1).err().unwrap();
        assert!(matches!(err, FeatureError::ArtifactNotFound(_)));
    }

    #[test]
    fn two_class_output_takes_second_column() {
        let p = class_one_probabilities(&[2, 2], &[0.9, 0.1, 0.2, 0.8], 2).unwrap();
        assert_eq!(p, vec![0.1, 0.8]);
    }

    #[test]
    fn single_column_outputs() {
        assert_eq!(class_one_probabilities(&[2, 1], &[0.3, 0.6], 2).unwrap(), vec![0.3, 0.6]);
        assert_eq!(class_one_probabilities(&[2], &[1.5, -0.2], 2).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn shape_mismatch_is_model_error() {
        assert!(class_one_probabilities(&[3, 2], &[0.0; 6], 2).is_err());
    }
}
