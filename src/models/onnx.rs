//! ONNX Runtime classifier

use crate::error::ModelLoadError;
use crate::models::FraudClassifier;
use anyhow::{anyhow, bail, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// XGBoost model exported to ONNX, served through an ONNX Runtime session
pub struct OnnxClassifier {
    /// Model name
    name: String,
    /// ONNX Runtime session; running it needs `&mut`, hence the mutex
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name for probabilities
    output_name: String,
}

impl OnnxClassifier {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(|e| ModelLoadError::Runtime(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelLoadError::Runtime(format!("optimization level: {}", e)))?
            .with_intra_threads(threads)
            .map_err(|e| ModelLoadError::Runtime(format!("intra threads: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| {
                ModelLoadError::Runtime(format!("failed to load {}: {}", path.display(), e))
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ModelLoadError::Invalid("ONNX model declares no inputs".to_string()))?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelLoadError::Invalid("ONNX model declares no outputs".to_string()))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl FraudClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| anyhow!("Failed to create input tensor: {}", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| anyhow!("ONNX inference failed: {}", e))?;

        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(prob) = self.extract_probability(output) {
                debug!(model = %self.name, prob = prob, "Extracted probability");
                return Ok(prob);
            }
        }

        // Fallback: first output that is not the label and yields a probability
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = self.extract_probability(&output) {
                debug!(model = %self.name, output = %name, prob = prob, "Extracted probability (fallback)");
                return Ok(prob);
            }
        }

        bail!("model {} produced no probability output", self.name)
    }
}

impl OnnxClassifier {
    /// Read the fraud probability from a float tensor, or from the
    /// `seq(map(int64, float))` an skl2onnx ZipMap step emits
    fn extract_probability(&self, output: &DynValue) -> Option<f64> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return fraud_prob_from_tensor(&dims, data);
        }

        let dtype = output.dtype();
        if !DynSequenceValueType::can_downcast(&dtype) {
            return None;
        }
        match class_probabilities(output) {
            Ok(pairs) => fraud_prob_from_class_map(&pairs),
            Err(e) => {
                debug!(model = %self.name, error = %e, "Unreadable probability sequence");
                None
            }
        }
    }
}

/// Class/probability pairs of the first map in a `seq(map(int64, float))`
fn class_probabilities(output: &DynValue) -> Result<Vec<(i64, f32)>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    // Batch size is always 1
    let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;
    let kv_pairs = first.try_extract_key_values::<i64, f32>()?;

    let mut pairs = Vec::new();
    for (class_id, prob) in &kv_pairs {
        pairs.push((*class_id, *prob));
    }
    Ok(pairs)
}

/// Probability of class 1, or the complement of class 0 when the map
/// carries only that
fn fraud_prob_from_class_map(pairs: &[(i64, f32)]) -> Option<f64> {
    if let Some(&(_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Some(prob as f64);
    }
    pairs
        .iter()
        .find(|(class, _)| *class == 0)
        .map(|&(_, prob)| 1.0 - prob as f64)
}

/// Fraud-class probability from a `[batch, classes]` or `[classes]` tensor
fn fraud_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => *classes,
        _ => return None,
    };

    let idx = match classes {
        1 => 0,
        c if c >= 2 => 1,
        _ => return None,
    };

    data.get(idx).map(|&p| p as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prob_from_two_class_tensor() {
        assert_eq!(fraud_prob_from_tensor(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(fraud_prob_from_tensor(&[2], &[0.25, 0.75]), Some(0.75));
    }

    #[test]
    fn test_prob_from_single_output_tensor() {
        assert_eq!(fraud_prob_from_tensor(&[1, 1], &[0.5]), Some(0.5));
    }

    #[test]
    fn test_prob_from_unexpected_shape() {
        assert_eq!(fraud_prob_from_tensor(&[1, 2, 2], &[0.0; 4]), None);
        assert_eq!(fraud_prob_from_tensor(&[1, 2], &[0.1]), None);
        assert_eq!(fraud_prob_from_tensor(&[1, 0], &[]), None);
    }

    #[test]
    fn test_prob_from_class_map() {
        assert_eq!(fraud_prob_from_class_map(&[(0, 0.25), (1, 0.75)]), Some(0.75));
        assert_eq!(fraud_prob_from_class_map(&[(1, 0.5), (0, 0.5)]), Some(0.5));
    }

    #[test]
    fn test_prob_from_class_map_without_fraud_class() {
        assert_eq!(fraud_prob_from_class_map(&[(0, 0.25)]), Some(0.75));
        assert_eq!(fraud_prob_from_class_map(&[(2, 0.5)]), None);
        assert_eq!(fraud_prob_from_class_map(&[]), None);
    }

    #[test]
    fn test_missing_model_file() {
        let result = OnnxClassifier::load("/nonexistent/xgboost.onnx", "xgboost", 1);
        assert!(matches!(result, Err(ModelLoadError::NotFound(_))));
    }
}
