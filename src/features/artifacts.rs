//! Preprocessing artifact saved alongside the trained model

use crate::error::ModelLoadError;
use crate::features::encoder::EncoderSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Encoders for the three categorical inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSet {
    pub payment_method: EncoderSpec,
    pub merchant_category: EncoderSpec,
    pub location: EncoderSpec,
}

/// Standard scaling parameters aligned with `feature_columns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerSpec {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Contents of `preprocessing.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingArtifacts {
    /// Column names in the order the model was trained on
    pub feature_columns: Vec<String>,
    pub encoders: EncoderSet,
    #[serde(default)]
    pub scaler: Option<ScalerSpec>,
    #[serde(default = "default_high_risk_payment_methods")]
    pub high_risk_payment_methods: Vec<String>,
}

fn default_high_risk_payment_methods() -> Vec<String> {
    vec!["Card".to_string(), "Net Banking".to_string()]
}

impl PreprocessingArtifacts {
    /// Read and parse the artifact file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifacts: Self =
            serde_json::from_str(&raw).map_err(|source| ModelLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            features = artifacts.feature_columns.len(),
            scaled = artifacts.scaler.is_some(),
            "Preprocessing artifacts loaded"
        );

        Ok(artifacts)
    }
}

/// `(x - mean) / scale` per column
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn from_spec(spec: &ScalerSpec, width: usize) -> Result<Self, ModelLoadError> {
        if spec.mean.len() != width || spec.scale.len() != width {
            return Err(ModelLoadError::Invalid(format!(
                "scaler has {} means and {} scales for {} feature columns",
                spec.mean.len(),
                spec.scale.len(),
                width
            )));
        }
        if spec.mean.iter().chain(&spec.scale).any(|v| !v.is_finite()) {
            return Err(ModelLoadError::Invalid(
                "scaler parameters must be finite".to_string(),
            ));
        }

        // sklearn stores a scale of 1 for constant columns; accept 0 as the same
        let scale = spec
            .scale
            .iter()
            .map(|&s| if s == 0.0 { 1.0 } else { s })
            .collect();

        Ok(Self {
            mean: spec.mean.clone(),
            scale,
        })
    }

    pub fn transform(&self, raw: &[f64]) -> Vec<f32> {
        raw.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&mean, &scale))| ((x - mean) / scale) as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "feature_columns": ["Amount_Log", "Hour"],
        "encoders": {
            "payment_method": {"classes": ["UPI"]},
            "merchant_category": {"classes": ["Others"]},
            "location": {"classes": ["Mumbai"]}
        }
    }"#;

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let artifacts = PreprocessingArtifacts::load(file.path()).unwrap();
        assert_eq!(artifacts.feature_columns, vec!["Amount_Log", "Hour"]);
        assert!(artifacts.scaler.is_none());
        assert_eq!(artifacts.high_risk_payment_methods, vec!["Card", "Net Banking"]);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let missing = PreprocessingArtifacts::load("/nonexistent/preprocessing.json");
        assert!(matches!(missing, Err(ModelLoadError::NotFound(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"feature_columns\": [").unwrap();
        let malformed = PreprocessingArtifacts::load(file.path());
        assert!(matches!(malformed, Err(ModelLoadError::Parse { .. })));
    }

    #[test]
    fn test_scaler_transform() {
        let spec = ScalerSpec {
            mean: vec![10.0, 5.0],
            scale: vec![2.0, 0.0],
        };
        let scaler = StandardScaler::from_spec(&spec, 2).unwrap();
        assert_eq!(scaler.transform(&[14.0, 7.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn test_scaler_width_mismatch() {
        let spec = ScalerSpec {
            mean: vec![0.0],
            scale: vec![1.0],
        };
        assert!(StandardScaler::from_spec(&spec, 3).is_err());
    }
}
