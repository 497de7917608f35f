//! Runtime statistics for the risk scorer.

use crate::types::RiskTier;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Processing-time samples kept for percentiles
const MAX_SAMPLES: usize = 10_000;

/// Metrics collector shared by the HTTP handlers and the stream worker
pub struct ScoringMetrics {
    /// Transactions scored successfully
    pub transactions_scored: AtomicU64,
    /// Transactions rejected by input validation
    pub validation_errors: AtomicU64,
    /// Classifier failures
    pub inference_errors: AtomicU64,
    /// Categorical values that fell back to the unseen bucket
    pub unseen_categories: AtomicU64,
    /// Scored transactions labelled fraudulent
    pub flagged_fraud: AtomicU64,
    /// Batch uploads processed
    pub batches: AtomicU64,
    /// Alerts published on the stream
    pub alerts_published: AtomicU64,
    by_tier: RwLock<BTreeMap<RiskTier, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            inference_errors: AtomicU64::new(0),
            unseen_categories: AtomicU64::new(0),
            flagged_fraud: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            alerts_published: AtomicU64::new(0),
            by_tier: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored transaction
    pub fn record_score(
        &self,
        processing_time: Duration,
        probability: f64,
        tier: RiskTier,
        is_fraud: bool,
    ) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);
        if is_fraud {
            self.flagged_fraud.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        let bucket = ((probability * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut by_tier) = self.by_tier.write() {
            *by_tier.entry(tier).or_insert(0) += 1;
        }
    }

    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unseen(&self, count: usize) {
        self.unseen_categories
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let pct = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: pct(0.50),
            p95_us: pct(0.95),
            p99_us: pct(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    pub fn get_tier_counts(&self) -> BTreeMap<RiskTier, u64> {
        self.by_tier.read().map(|t| t.clone()).unwrap_or_default()
    }

    /// Point-in-time copy for the stats endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            transactions_scored: self.transactions_scored.load(Ordering::Relaxed),
            flagged_fraud: self.flagged_fraud.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            unseen_categories: self.unseen_categories.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            alerts_published: self.alerts_published.load(Ordering::Relaxed),
            throughput_per_sec: self.get_throughput(),
            by_tier: self.get_tier_counts(),
            processing: self.get_processing_stats(),
            score_distribution: self.get_score_distribution(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snap = self.snapshot();
        let fraud_rate = if snap.transactions_scored > 0 {
            (snap.flagged_fraud as f64 / snap.transactions_scored as f64) * 100.0
        } else {
            0.0
        };

        info!(
            scored = snap.transactions_scored,
            throughput = format!("{:.1} tx/s", snap.throughput_per_sec),
            fraud_rate = format!("{:.1}%", fraud_rate),
            validation_errors = snap.validation_errors,
            inference_errors = snap.inference_errors,
            unseen_categories = snap.unseen_categories,
            batches = snap.batches,
            alerts = snap.alerts_published,
            "Scoring summary"
        );
        info!(
            mean_us = snap.processing.mean_us,
            p50_us = snap.processing.p50_us,
            p95_us = snap.processing.p95_us,
            p99_us = snap.processing.p99_us,
            "Processing time"
        );
        for (tier, count) in &snap.by_tier {
            info!(tier = %tier, count = count, "Tier count");
        }
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub transactions_scored: u64,
    pub flagged_fraud: u64,
    pub validation_errors: u64,
    pub inference_errors: u64,
    pub unseen_categories: u64,
    pub batches: u64,
    pub alerts_published: u64,
    pub throughput_per_sec: f64,
    pub by_tier: BTreeMap<RiskTier, u64>,
    pub processing: ProcessingStats,
    pub score_distribution: [u64; 10],
}

/// Prints a summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ScoringMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScoringMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
