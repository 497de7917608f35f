//! Fraud alert data structures

use crate::types::score::{RiskTier, ScoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert published when a streamed transaction lands in an alerting tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Caller-assigned transaction ID, if the message carried one
    pub transaction_id: Option<String>,

    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,

    pub risk_tier: RiskTier,

    pub is_fraud: bool,

    pub recommendation: String,

    /// Transaction amount
    pub amount: f64,

    pub payment_method: Option<String>,

    pub location: Option<String>,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    /// Create a new fraud alert from a score
    pub fn new(transaction_id: Option<String>, score: &ScoreResult) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            probability: score.probability,
            risk_tier: score.risk_tier,
            is_fraud: score.is_fraud,
            recommendation: score.recommendation.clone(),
            amount: 0.0,
            payment_method: None,
            location: None,
            timestamp: Utc::now(),
        }
    }

    /// Add transaction details to the alert
    pub fn with_transaction_details(
        mut self,
        amount: f64,
        payment_method: Option<String>,
        location: Option<String>,
    ) -> Self {
        self.amount = amount;
        self.payment_method = payment_method;
        self.location = location;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraud_alert_serialization() {
        let score = ScoreResult {
            probability: 0.85,
            risk_tier: RiskTier::High,
            is_fraud: true,
            recommendation: "Immediate investigation required".to_string(),
        };

        let alert = FraudAlert::new(Some("tx_123".to_string()), &score)
            .with_transaction_details(500000.0, Some("NEFT".to_string()), None);

        let json = serde_json::to_string(&alert).unwrap();
        let deserialized: FraudAlert = serde_json::from_str(&json).unwrap();

        assert_eq!(alert.alert_id, deserialized.alert_id);
        assert_eq!(deserialized.transaction_id.as_deref(), Some("tx_123"));
        assert_eq!(deserialized.risk_tier, RiskTier::High);
        assert_eq!(deserialized.amount, 500000.0);
        assert!(json.contains("\"HIGH\""));
    }
}
