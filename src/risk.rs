//! Mapping from fraud probability to risk tier, label and recommendation

use crate::types::RiskTier;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One row of the tier table: probabilities strictly above `above` fall
/// into `tier` unless a higher row matches first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub tier: RiskTier,
    pub above: f64,
    pub recommendation: String,
}

/// Tunable risk settings as they appear in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicyConfig {
    /// `is_fraud = probability > decision_threshold`
    pub decision_threshold: f64,
    pub tiers: Vec<TierRule>,
}

const DEFAULT_DECISION_THRESHOLD: f64 = 0.5;

/// Default tier table, highest threshold first; the last row is the floor
fn default_tiers() -> (Vec<TierRule>, TierRule) {
    let floor = TierRule {
        tier: RiskTier::Low,
        above: 0.0,
        recommendation: "Routine processing - Low fraud risk".to_string(),
    };
    let tiers = vec![
        TierRule {
            tier: RiskTier::High,
            above: 0.70,
            recommendation: "Immediate investigation required - High fraud risk detected"
                .to_string(),
        },
        TierRule {
            tier: RiskTier::Medium,
            above: 0.30,
            recommendation: "Further verification recommended - Medium fraud risk".to_string(),
        },
        floor.clone(),
    ];
    (tiers, floor)
}

impl Default for RiskPolicyConfig {
    fn default() -> Self {
        Self {
            decision_threshold: DEFAULT_DECISION_THRESHOLD,
            tiers: default_tiers().0,
        }
    }
}

/// Validated tier table, rules sorted from the highest threshold down
#[derive(Debug, Clone)]
pub struct RiskPolicy {
    decision_threshold: f64,
    rules: Vec<TierRule>,
    /// Lowest rule, applied when no threshold is exceeded
    floor: TierRule,
}

/// Outcome of classifying one probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment<'a> {
    pub tier: RiskTier,
    pub is_fraud: bool,
    pub recommendation: &'a str,
}

impl RiskPolicy {
    pub fn from_config(config: &RiskPolicyConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.decision_threshold) {
            bail!(
                "decision_threshold {} must be within [0, 1]",
                config.decision_threshold
            );
        }
        let mut rules = config.tiers.clone();
        for (i, rule) in rules.iter().enumerate() {
            if !(0.0..=1.0).contains(&rule.above) {
                bail!("tier {} threshold {} must be within [0, 1]", rule.tier, rule.above);
            }
            if rules[..i].iter().any(|r| r.tier == rule.tier) {
                bail!("tier {} appears more than once", rule.tier);
            }
        }
        rules.sort_by(|a, b| b.above.total_cmp(&a.above));

        let Some(floor) = rules.last().cloned() else {
            bail!("risk tier table is empty");
        };

        Ok(Self {
            decision_threshold: config.decision_threshold,
            rules,
            floor,
        })
    }

    /// Tier of the highest rule the probability strictly exceeds, or the
    /// lowest rule when it exceeds none
    pub fn assess(&self, probability: f64) -> Assessment<'_> {
        let rule = self
            .rules
            .iter()
            .find(|r| probability > r.above)
            .unwrap_or(&self.floor);

        Assessment {
            tier: rule.tier,
            is_fraud: probability > self.decision_threshold,
            recommendation: &rule.recommendation,
        }
    }

    pub fn decision_threshold(&self) -> f64 {
        self.decision_threshold
    }

    pub fn rules(&self) -> &[TierRule] {
        &self.rules
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        let (rules, floor) = default_tiers();
        Self {
            decision_threshold: DEFAULT_DECISION_THRESHOLD,
            rules,
            floor,
        }
    }
}
