//! ML model inference components

pub mod loader;
pub mod onnx;
pub mod xgboost;

pub use loader::ModelLoader;
pub use onnx::OnnxClassifier;
pub use xgboost::XgbTreeEnsemble;

/// A trained binary classifier producing the fraud-class probability.
///
/// Implementations are loaded once at startup and shared across requests,
/// so they must be safe to call from many threads at once.
pub trait FraudClassifier: Send + Sync {
    /// Model name for logs and the health endpoint
    fn name(&self) -> &str;

    /// Input width the model declares, when the format records it
    fn expected_features(&self) -> Option<usize> {
        None
    }

    /// Probability of the fraud class for one feature vector
    fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64>;
}
