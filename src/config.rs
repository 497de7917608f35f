//! Configuration management for the risk scorer

use crate::features::InputDefaults;
use crate::risk::RiskPolicyConfig;
use crate::types::RiskTier;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "FRAUD_SCORER_CONFIG";

/// On-disk format of the classifier artifact
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Pick by file extension: `.onnx` or `.json`
    #[default]
    Auto,
    /// XGBoost exported to ONNX, run with ONNX Runtime
    Onnx,
    /// XGBoost native JSON model, evaluated in process
    XgboostJson,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub risk: RiskPolicyConfig,
    pub defaults: InputDefaults,
    pub nats: NatsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Largest accepted `/upload` body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing the model and preprocessing artifacts
    pub models_dir: String,
    /// Classifier file name inside `models_dir`
    pub classifier_file: String,
    /// Preprocessing artifact file name inside `models_dir`
    pub preprocessing_file: String,
    pub format: ModelFormat,
    /// Name reported in logs and responses
    pub model_name: String,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl ModelsConfig {
    pub fn classifier_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.classifier_file)
    }

    pub fn preprocessing_path(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.preprocessing_file)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            classifier_file: "xgboost.json".to_string(),
            preprocessing_file: "preprocessing.json".to_string(),
            format: ModelFormat::Auto,
            model_name: "xgboost".to_string(),
            onnx_threads: 1,
        }
    }
}

/// NATS stream configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Run the stream worker alongside the HTTP API
    pub enabled: bool,
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
    /// Maximum messages scored concurrently
    pub workers: usize,
    /// Lowest tier that produces an alert
    pub alert_min_tier: RiskTier,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "transactions".to_string(),
            alert_subject: "fraud.alerts".to_string(),
            workers: 4,
            alert_min_tier: RiskTier::High,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summary log lines; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from `FRAUD_SCORER_CONFIG` or the default path,
    /// overlaid with `FRAUD_SCORER__SECTION__KEY` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path; a missing file means defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("FRAUD_SCORER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
