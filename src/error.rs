//! Error taxonomy for scoring and model loading

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a scoring call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    /// Malformed or missing input field; always the caller's fault
    #[error("{0}")]
    Validation(String),

    /// Unexpected failure inside the classifier
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoringError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScoringError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ScoringError::Validation(_))
    }
}

/// Startup failure loading the classifier or its preprocessing tables.
///
/// Fatal: the service must not accept traffic on a partially loaded model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("classifier rejected a {width}-feature test vector: {reason}")]
    ShapeMismatch { width: usize, reason: String },

    #[error("onnx runtime: {0}")]
    Runtime(String),
}

pub type ScoringResult<T> = Result<T, ScoringError>;
