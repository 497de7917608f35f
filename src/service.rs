//! Scoring service: feature preparation, inference and risk assessment
//!
//! Owns the loaded artifacts for the lifetime of the process. All scoring
//! methods take `&self`, so one instance is shared behind an `Arc` by the
//! HTTP handlers and the stream worker.

use crate::config::AppConfig;
use crate::error::{ModelLoadError, ScoringError, ScoringResult};
use crate::features::FeaturePreparer;
use crate::metrics::ScoringMetrics;
use crate::models::{FraudClassifier, ModelLoader};
use crate::risk::RiskPolicy;
use crate::types::{BatchResult, ScoreResult, TransactionInput};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Message recorded against a batch row whose inference failed
pub const ROW_INFERENCE_ERROR: &str = "internal inference error";

pub struct ScoringService {
    preparer: FeaturePreparer,
    classifier: Arc<dyn FraudClassifier>,
    policy: RiskPolicy,
    metrics: Arc<ScoringMetrics>,
}

impl ScoringService {
    pub fn new(
        preparer: FeaturePreparer,
        classifier: Arc<dyn FraudClassifier>,
        policy: RiskPolicy,
    ) -> Self {
        Self {
            preparer,
            classifier,
            policy,
            metrics: Arc::new(ScoringMetrics::new()),
        }
    }

    /// Share a metrics collector with other components
    pub fn with_metrics(mut self, metrics: Arc<ScoringMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Load every artifact named by the config and check that the
    /// classifier accepts vectors of the preparer's width.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelLoadError> {
        let policy = RiskPolicy::from_config(&config.risk)
            .map_err(|e| ModelLoadError::Invalid(format!("risk policy: {e}")))?;

        let loader = ModelLoader::with_threads(config.models.onnx_threads);
        let preparer = loader.load_preparer(&config.models, config.defaults.clone())?;
        let classifier = loader.load_classifier(&config.models)?;

        let service = Self::new(preparer, classifier, policy);
        service.check_model_shape()?;

        info!(
            model = %service.model_name(),
            features = service.feature_count(),
            decision_threshold = service.policy.decision_threshold(),
            "Scoring service ready"
        );
        Ok(service)
    }

    /// Run one zero vector through the classifier
    pub fn check_model_shape(&self) -> Result<(), ModelLoadError> {
        let width = self.preparer.feature_count();

        if let Some(expected) = self.classifier.expected_features() {
            if expected != width {
                return Err(ModelLoadError::ShapeMismatch {
                    width,
                    reason: format!("model expects {expected} features"),
                });
            }
        }

        let zeros = vec![0.0f32; width];
        let p = self
            .classifier
            .predict_proba(&zeros)
            .map_err(|e| ModelLoadError::ShapeMismatch {
                width,
                reason: e.to_string(),
            })?;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ModelLoadError::ShapeMismatch {
                width,
                reason: format!("zero vector scored {p}, not a probability"),
            });
        }

        debug!(width, probability = p, "Classifier shape check passed");
        Ok(())
    }

    /// Score a single transaction
    pub fn score_one(&self, input: &TransactionInput) -> ScoringResult<ScoreResult> {
        let start = Instant::now();

        let features = match self.preparer.prepare(input) {
            Ok(f) => f,
            Err(e) => {
                if e.is_validation() {
                    self.metrics.record_validation_error();
                }
                return Err(e);
            }
        };
        if !features.unseen_fields().is_empty() {
            self.metrics.record_unseen(features.unseen_fields().len());
        }

        let probability = self
            .classifier
            .predict_proba(features.as_slice())
            .map_err(|e| ScoringError::Inference(e.to_string()))
            .and_then(|p| {
                if p.is_finite() && (0.0..=1.0).contains(&p) {
                    Ok(p)
                } else {
                    Err(ScoringError::Inference(format!(
                        "classifier returned {p}, not a probability"
                    )))
                }
            })
            .inspect_err(|_| self.metrics.record_inference_error())?;

        let assessment = self.policy.assess(probability);
        let elapsed = start.elapsed();
        self.metrics
            .record_score(elapsed, probability, assessment.tier, assessment.is_fraud);

        debug!(
            probability,
            tier = %assessment.tier,
            is_fraud = assessment.is_fraud,
            unseen = ?features.unseen_fields(),
            processing_time_us = elapsed.as_micros() as u64,
            "Transaction scored"
        );

        Ok(ScoreResult {
            probability,
            risk_tier: assessment.tier,
            is_fraud: assessment.is_fraud,
            recommendation: assessment.recommendation.to_string(),
        })
    }

    /// Score a sequence of transactions in order
    pub fn score_batch(&self, inputs: &[TransactionInput]) -> BatchResult {
        self.score_rows(inputs.iter().cloned().map(Ok))
    }

    /// Score rows that may already have failed parsing.
    ///
    /// Every row gets its 1-based position as `transaction_id`; rows that
    /// fail are flagged in `errors` and the batch carries on.
    pub fn score_rows<I>(&self, rows: I) -> BatchResult
    where
        I: IntoIterator<Item = ScoringResult<TransactionInput>>,
    {
        let start = Instant::now();
        let mut batch = BatchResult::default();

        for (idx, row) in rows.into_iter().enumerate() {
            let row_id = idx + 1;
            let scored = row
                .inspect_err(|e| {
                    if e.is_validation() {
                        self.metrics.record_validation_error();
                    }
                })
                .and_then(|input| self.score_one(&input));

            match scored {
                Ok(score) => batch.push_scored(row_id, &score),
                Err(ScoringError::Validation(msg)) => batch.push_error(row_id, msg),
                Err(e @ ScoringError::Inference(_)) => {
                    error!(row = row_id, error = %e, "Inference failed for batch row");
                    batch.push_error(row_id, ROW_INFERENCE_ERROR);
                }
            }
        }

        self.metrics.record_batch();
        info!(
            total = batch.summary.total,
            fraudulent = batch.summary.fraudulent,
            rejected = batch.summary.rejected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch scored"
        );
        batch
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn feature_count(&self) -> usize {
        self.preparer.feature_count()
    }

    pub fn preparer(&self) -> &FeaturePreparer {
        &self.preparer
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<ScoringMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::artifacts::PreprocessingArtifacts;
    use crate::features::InputDefaults;
    use crate::types::RiskTier;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ARTIFACTS: &str = r#"{
        "feature_columns": ["Amount", "Payment_Method_Encoded", "Location_Encoded", "Hour"],
        "encoders": {
            "payment_method": {"classes": ["Card", "NEFT", "UPI"]},
            "merchant_category": {"classes": ["Others", "Retail"]},
            "location": {"classes": ["Delhi", "Mumbai"]}
        }
    }"#;

    /// Returns the probability stored in the amount column
    struct AmountIsProbability {
        calls: AtomicUsize,
    }

    impl FraudClassifier for AmountIsProbability {
        fn name(&self) -> &str {
            "stub"
        }

        fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let p = features[0] as f64;
            if p == 0.666 as f32 as f64 {
                bail!("synthetic failure");
            }
            Ok(p)
        }
    }

    struct FixedWidth(usize);

    impl FraudClassifier for FixedWidth {
        fn name(&self) -> &str {
            "fixed"
        }

        fn expected_features(&self) -> Option<usize> {
            Some(self.0)
        }

        fn predict_proba(&self, _features: &[f32]) -> anyhow::Result<f64> {
            Ok(0.5)
        }
    }

    fn preparer() -> FeaturePreparer {
        let artifacts: PreprocessingArtifacts = serde_json::from_str(ARTIFACTS).unwrap();
        FeaturePreparer::from_artifacts(&artifacts, InputDefaults::default()).unwrap()
    }

    fn service() -> (ScoringService, Arc<AmountIsProbability>) {
        let stub = Arc::new(AmountIsProbability {
            calls: AtomicUsize::new(0),
        });
        let service = ScoringService::new(preparer(), stub.clone(), RiskPolicy::default());
        (service, stub)
    }

    fn tx(amount: f64) -> TransactionInput {
        TransactionInput::new(amount)
            .with_payment_method("UPI")
            .with_merchant_category("Retail")
            .with_location("Mumbai")
            .with_time("2024-03-15T14:30:00")
    }

    #[test]
    fn test_score_one_tiers() {
        let (service, _) = service();

        let high = service.score_one(&tx(0.85)).unwrap();
        assert_eq!(high.risk_tier, RiskTier::High);
        assert!(high.is_fraud);
        assert!(high.recommendation.starts_with("Immediate investigation"));

        let medium = service.score_one(&tx(0.45)).unwrap();
        assert_eq!(medium.risk_tier, RiskTier::Medium);
        assert!(!medium.is_fraud);

        let low = service.score_one(&tx(0.10)).unwrap();
        assert_eq!(low.risk_tier, RiskTier::Low);
        assert!(!low.is_fraud);
    }

    #[test]
    fn test_score_one_is_deterministic() {
        let (service, _) = service();
        let a = service.score_one(&tx(0.37)).unwrap();
        let b = service.score_one(&tx(0.37)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_scoring_is_consistent() {
        let (service, stub) = service();
        let service = Arc::new(service);
        let input = tx(0.55);
        let expected = service.score_one(&input).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let service = Arc::clone(&service);
                    let input = &input;
                    scope.spawn(move || {
                        (0..25)
                            .map(|_| service.score_one(input).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for handle in handles {
                for result in handle.join().unwrap() {
                    assert_eq!(result, expected);
                }
            }
        });

        assert_eq!(stub.calls.load(Ordering::SeqCst), 201);
        assert_eq!(service.metrics().snapshot().transactions_scored, 201);
    }

    #[test]
    fn test_missing_amount_never_reaches_classifier() {
        let (service, stub) = service();
        let input = TransactionInput {
            amount: None,
            ..tx(0.2)
        };

        let err = service.score_one(&input).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Amount"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.metrics().snapshot().validation_errors, 1);
    }

    #[test]
    fn test_unseen_categories_still_score() {
        let (service, _) = service();
        let input = tx(0.2).with_payment_method("Crypto").with_location("Atlantis");

        let result = service.score_one(&input).unwrap();
        assert_eq!(result.risk_tier, RiskTier::Low);
        assert_eq!(service.metrics().snapshot().unseen_categories, 2);
    }

    #[test]
    fn test_classifier_failure_is_inference_error() {
        let (service, _) = service();
        let err = service.score_one(&tx(0.666)).unwrap_err();
        assert!(matches!(err, ScoringError::Inference(_)));
        assert_eq!(service.metrics().snapshot().inference_errors, 1);
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let (service, _) = service();
        let err = service.score_one(&tx(1.5)).unwrap_err();
        assert!(matches!(err, ScoringError::Inference(_)));
    }

    #[test]
    fn test_batch_preserves_order_and_counts() {
        let (service, _) = service();
        let inputs = vec![tx(0.9), tx(0.1), tx(0.6), tx(0.4)];

        let batch = service.score_batch(&inputs);
        let ids: Vec<usize> = batch.results.iter().map(|r| r.transaction_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(batch.results[0].investigation_priority, RiskTier::High);
        assert_eq!(batch.results[1].investigation_priority, RiskTier::Low);
        assert_eq!(batch.summary.total, 4);
        assert_eq!(batch.summary.fraudulent, 2);
        assert_eq!(batch.summary.legit, 2);
        assert_eq!(
            batch.summary.total,
            batch.summary.fraudulent + batch.summary.legit
        );
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let (service, _) = service();
        let batch = service.score_batch(&[]);
        assert!(batch.results.is_empty());
        assert!(batch.errors.is_empty());
        assert_eq!(batch.summary, Default::default());
    }

    #[test]
    fn test_batch_flags_bad_rows_and_continues() {
        let (service, _) = service();
        let rows = vec![
            Ok(tx(0.9)),
            Err(ScoringError::validation("Amount: 'abc' is not a number")),
            Ok(TransactionInput {
                amount: Some(-5.0),
                ..tx(0.0)
            }),
            Ok(tx(0.666)),
            Ok(tx(0.2)),
        ];

        let batch = service.score_rows(rows);
        assert_eq!(batch.summary.total, 2);
        assert_eq!(batch.summary.rejected, 3);
        assert_eq!(batch.results[0].transaction_id, 1);
        assert_eq!(batch.results[1].transaction_id, 5);

        let errors: Vec<(usize, &str)> = batch
            .errors
            .iter()
            .map(|e| (e.transaction_id, e.error.as_str()))
            .collect();
        assert_eq!(errors[0], (2, "Amount: 'abc' is not a number"));
        assert_eq!(errors[1].0, 3);
        assert!(errors[1].1.contains("non-negative"));
        assert_eq!(errors[2], (4, ROW_INFERENCE_ERROR));
    }

    #[test]
    fn test_shape_check_rejects_width_mismatch() {
        let service = ScoringService::new(preparer(), Arc::new(FixedWidth(7)), RiskPolicy::default());
        assert!(matches!(
            service.check_model_shape(),
            Err(ModelLoadError::ShapeMismatch { width: 4, .. })
        ));

        let service = ScoringService::new(preparer(), Arc::new(FixedWidth(4)), RiskPolicy::default());
        assert!(service.check_model_shape().is_ok());
    }
}
