//! Transaction fraud risk scoring
//!
//! Turns a raw payment transaction into a fraud probability with a
//! pre-trained XGBoost classifier, then maps it to a risk tier, a binary
//! label and a recommendation. Served over HTTP (single and CSV batch
//! scoring) and optionally over a NATS subject.

pub mod batch;
pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod metrics;
pub mod models;
pub mod risk;
pub mod service;
pub mod stream;
pub mod types;

pub use config::AppConfig;
pub use error::{ModelLoadError, ScoringError};
pub use features::FeaturePreparer;
pub use service::ScoringService;
pub use types::{BatchResult, FraudAlert, RiskTier, ScoreResult, TransactionInput};
