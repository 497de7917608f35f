//! Startup loading of the classifier and its preprocessing tables

use crate::config::{ModelFormat, ModelsConfig};
use crate::error::ModelLoadError;
use crate::features::{FeaturePreparer, InputDefaults};
use crate::models::{FraudClassifier, OnnxClassifier, XgbTreeEnsemble};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loader for model artifacts
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Resolve `Auto` to a concrete format from the file extension
    pub fn resolve_format(format: ModelFormat, path: &Path) -> Result<ModelFormat, ModelLoadError> {
        match format {
            ModelFormat::Auto => match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("onnx") => Ok(ModelFormat::Onnx),
                Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(ModelFormat::XgboostJson),
                _ => Err(ModelLoadError::Invalid(format!(
                    "cannot infer model format of {}; set models.format",
                    path.display()
                ))),
            },
            explicit => Ok(explicit),
        }
    }

    /// Load the classifier named by the config
    pub fn load_classifier(
        &self,
        models: &ModelsConfig,
    ) -> Result<Arc<dyn FraudClassifier>, ModelLoadError> {
        let path = models.classifier_path();
        let format = Self::resolve_format(models.format, &path)?;

        info!(
            model = %models.model_name,
            path = %path.display(),
            format = ?format,
            "Loading classifier"
        );

        let classifier: Arc<dyn FraudClassifier> = match format {
            ModelFormat::Onnx => Arc::new(OnnxClassifier::load(
                &path,
                &models.model_name,
                self.onnx_threads,
            )?),
            ModelFormat::XgboostJson | ModelFormat::Auto => {
                Arc::new(XgbTreeEnsemble::load(&path, &models.model_name)?)
            }
        };

        Ok(classifier)
    }

    /// Load the feature preparer for the configured preprocessing artifact
    pub fn load_preparer(
        &self,
        models: &ModelsConfig,
        defaults: InputDefaults,
    ) -> Result<FeaturePreparer, ModelLoadError> {
        FeaturePreparer::load(models.preprocessing_path(), defaults)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format_from_extension() {
        assert_eq!(
            ModelLoader::resolve_format(ModelFormat::Auto, Path::new("m/xgboost.onnx")).unwrap(),
            ModelFormat::Onnx
        );
        assert_eq!(
            ModelLoader::resolve_format(ModelFormat::Auto, Path::new("m/xgboost.JSON")).unwrap(),
            ModelFormat::XgboostJson
        );
        assert!(ModelLoader::resolve_format(ModelFormat::Auto, Path::new("m/model.pkl")).is_err());
        assert_eq!(
            ModelLoader::resolve_format(ModelFormat::Onnx, Path::new("m/model.bin")).unwrap(),
            ModelFormat::Onnx
        );
    }

    #[test]
    fn test_missing_artifacts_fail() {
        let models = ModelsConfig {
            models_dir: "/nonexistent".to_string(),
            ..ModelsConfig::default()
        };
        let loader = ModelLoader::default();

        assert!(matches!(
            loader.load_classifier(&models),
            Err(ModelLoadError::NotFound(_))
        ));
        assert!(matches!(
            loader.load_preparer(&models, InputDefaults::default()),
            Err(ModelLoadError::NotFound(_))
        ));
    }
}
