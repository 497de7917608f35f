//! Real-time scoring of transactions published on NATS
//!
//! Each message on the transaction subject is scored with the shared
//! service; results at or above the configured tier are published as
//! `FraudAlert`s. In-flight messages are bounded by a semaphore.

pub mod consumer;
pub mod producer;

pub use consumer::TransactionConsumer;
pub use producer::AlertProducer;

use crate::config::NatsConfig;
use crate::error::ScoringError;
use crate::service::ScoringService;
use crate::types::{FraudAlert, RiskTier, StreamTransaction};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// What happened to one stream message
#[derive(Debug)]
pub enum Outcome {
    /// Scored at or above the alert tier
    Alert(FraudAlert),
    /// Scored below the alert tier
    Pass {
        transaction_id: Option<String>,
        probability: f64,
        tier: RiskTier,
    },
    /// Decoded but failed scoring
    Rejected {
        transaction_id: Option<String>,
        error: ScoringError,
    },
    /// Not a transaction
    Undecodable(String),
}

/// Score one raw message payload
pub fn evaluate(service: &ScoringService, payload: &[u8], alert_min_tier: RiskTier) -> Outcome {
    let message: StreamTransaction = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => return Outcome::Undecodable(e.to_string()),
    };

    match service.score_one(&message.input) {
        Ok(score) if score.risk_tier >= alert_min_tier => {
            let input = message.input;
            Outcome::Alert(
                FraudAlert::new(message.transaction_id, &score).with_transaction_details(
                    input.amount.unwrap_or_default(),
                    input.payment_method,
                    input.location,
                ),
            )
        }
        Ok(score) => Outcome::Pass {
            transaction_id: message.transaction_id,
            probability: score.probability,
            tier: score.risk_tier,
        },
        Err(error) => Outcome::Rejected {
            transaction_id: message.transaction_id,
            error,
        },
    }
}

/// Connects to NATS and scores transactions until the subscription ends
pub struct StreamWorker {
    service: Arc<ScoringService>,
    config: NatsConfig,
}

impl StreamWorker {
    pub fn new(service: Arc<ScoringService>, config: NatsConfig) -> Self {
        Self { service, config }
    }

    pub async fn run(self) -> Result<()> {
        let client = async_nats::connect(&self.config.url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", self.config.url))?;
        info!("Connected to NATS at {}", self.config.url);

        let consumer = TransactionConsumer::new(client.clone(), &self.config.transaction_subject);
        let producer = AlertProducer::new(client, &self.config.alert_subject);

        let workers = self.config.workers.max(1);
        info!(
            workers,
            subject = %consumer.subject(),
            alerts = %producer.subject(),
            min_tier = %self.config.alert_min_tier,
            "Starting stream worker"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let processed = Arc::new(AtomicU64::new(0));
        let mut subscription = consumer.subscribe().await?;

        while let Some(message) = subscription.next().await {
            // Acquire permit (limits concurrent tasks)
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("worker semaphore closed")?;

            let service = self.service.clone();
            let producer = producer.clone();
            let processed = processed.clone();
            let min_tier = self.config.alert_min_tier;

            tokio::spawn(async move {
                match evaluate(&service, &message.payload, min_tier) {
                    Outcome::Alert(alert) => {
                        if let Err(e) = producer.publish(&alert).await {
                            error!(
                                transaction_id = ?alert.transaction_id,
                                error = %e,
                                "Failed to publish fraud alert"
                            );
                        } else {
                            service.metrics().record_alert();
                            info!(
                                transaction_id = ?alert.transaction_id,
                                probability = alert.probability,
                                tier = %alert.risk_tier,
                                "Fraud alert published"
                            );
                        }
                    }
                    Outcome::Pass {
                        transaction_id,
                        probability,
                        tier,
                    } => {
                        debug!(
                            transaction_id = ?transaction_id,
                            probability,
                            tier = %tier,
                            "Transaction processed (below alert tier)"
                        );
                    }
                    Outcome::Rejected {
                        transaction_id,
                        error,
                    } => {
                        warn!(transaction_id = ?transaction_id, error = %error, "Transaction not scored");
                    }
                    Outcome::Undecodable(e) => {
                        warn!(error = %e, "Failed to deserialize transaction");
                    }
                }

                let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 100 == 0 {
                    let metrics = service.metrics();
                    info!(
                        processed = count,
                        throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                        avg_latency_us = metrics.get_processing_stats().mean_us,
                        "Processing milestone"
                    );
                }

                drop(permit);
            });
        }

        info!("Transaction subscription closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::artifacts::PreprocessingArtifacts;
    use crate::features::{FeaturePreparer, InputDefaults};
    use crate::models::FraudClassifier;
    use crate::risk::RiskPolicy;

    /// Scores international transactions as high risk
    struct LocationRule;

    impl FraudClassifier for LocationRule {
        fn name(&self) -> &str {
            "location-rule"
        }

        fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64> {
            Ok(if features[1] > 0.5 { 0.92 } else { 0.12 })
        }
    }

    fn service() -> ScoringService {
        let artifacts: PreprocessingArtifacts = serde_json::from_str(
            r#"{
                "feature_columns": ["Amount_Log", "Is_International"],
                "encoders": {
                    "payment_method": {"classes": ["UPI"]},
                    "merchant_category": {"classes": ["Others"]},
                    "location": {"classes": ["International_Dubai", "Mumbai"]}
                }
            }"#,
        )
        .unwrap();
        let preparer = FeaturePreparer::from_artifacts(&artifacts, InputDefaults::default()).unwrap();
        ScoringService::new(preparer, Arc::new(LocationRule), RiskPolicy::default())
    }

    #[test]
    fn test_high_risk_message_raises_alert() {
        let payload = br#"{"transaction_id": "tx_1", "Amount": 90000, "Payment_Method": "UPI", "Location": "International_Dubai"}"#;

        match evaluate(&service(), payload, RiskTier::High) {
            Outcome::Alert(alert) => {
                assert_eq!(alert.transaction_id.as_deref(), Some("tx_1"));
                assert_eq!(alert.risk_tier, RiskTier::High);
                assert!(alert.is_fraud);
                assert_eq!(alert.amount, 90000.0);
                assert_eq!(alert.location.as_deref(), Some("International_Dubai"));
            }
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_low_risk_message_passes() {
        let payload = br#"{"amount": 120.0, "location": "Mumbai"}"#;

        match evaluate(&service(), payload, RiskTier::High) {
            Outcome::Pass {
                transaction_id,
                tier,
                ..
            } => {
                assert_eq!(transaction_id, None);
                assert_eq!(tier, RiskTier::Low);
            }
            other => panic!("expected pass, got {:?}", other),
        }

        // Lowering the alert tier turns the same message into an alert
        assert!(matches!(
            evaluate(&service(), payload, RiskTier::Low),
            Outcome::Alert(_)
        ));
    }

    #[test]
    fn test_invalid_messages() {
        let payload = br#"{"transaction_id": "tx_2", "Location": "Mumbai"}"#;
        match evaluate(&service(), payload, RiskTier::High) {
            Outcome::Rejected {
                transaction_id,
                error,
            } => {
                assert_eq!(transaction_id.as_deref(), Some("tx_2"));
                assert!(error.is_validation());
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(matches!(
            evaluate(&service(), b"not json", RiskTier::High),
            Outcome::Undecodable(_)
        ));
    }

    #[test]
    fn test_alert_wire_format() {
        let payload = br#"{"Transaction_ID": "tx_3", "Amount": 5, "Location": "International_Dubai"}"#;
        let Outcome::Alert(alert) = evaluate(&service(), payload, RiskTier::High) else {
            panic!("expected alert");
        };

        let json: serde_json::Value =
            serde_json::from_slice(&producer::encode_alert(&alert).unwrap()).unwrap();
        assert_eq!(json["transaction_id"], "tx_3");
        assert_eq!(json["risk_tier"], "HIGH");
        assert!(json["alert_id"].as_str().is_some());
    }
}
