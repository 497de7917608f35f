//! Scoring outputs: single results, batch results and risk tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse investigation priority derived from the fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskTier::Low),
            "MEDIUM" => Ok(RiskTier::Medium),
            "HIGH" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier '{}'", other)),
        }
    }
}

/// Result of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Fraud probability in [0, 1]
    pub probability: f64,
    pub risk_tier: RiskTier,
    /// `probability > decision_threshold`
    pub is_fraud: bool,
    /// Static recommendation text for the tier
    pub recommendation: String,
}

/// One scored row of a batch, tagged with its 1-based row number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRow {
    pub transaction_id: usize,
    pub is_fraud: bool,
    pub probability: f64,
    pub investigation_priority: RiskTier,
}

/// A row that could not be scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub transaction_id: usize,
    pub error: String,
}

/// Aggregate counts over the scored rows of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub legit: usize,
    pub fraudulent: usize,
    /// Rows flagged in `errors` and left out of `total`
    pub rejected: usize,
}

/// Ordered outcome of a batch: scored rows, flagged rows and counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<BatchRow>,
    pub errors: Vec<RowError>,
    pub summary: BatchSummary,
}

impl BatchResult {
    /// Append a scored row and update the counts
    pub fn push_scored(&mut self, transaction_id: usize, score: &ScoreResult) {
        self.results.push(BatchRow {
            transaction_id,
            is_fraud: score.is_fraud,
            probability: score.probability,
            investigation_priority: score.risk_tier,
        });
        self.summary.total += 1;
        if score.is_fraud {
            self.summary.fraudulent += 1;
        } else {
            self.summary.legit += 1;
        }
    }

    /// Append a rejected row
    pub fn push_error(&mut self, transaction_id: usize, error: impl Into<String>) {
        self.errors.push(RowError {
            transaction_id,
            error: error.into(),
        });
        self.summary.rejected += 1;
    }
}
