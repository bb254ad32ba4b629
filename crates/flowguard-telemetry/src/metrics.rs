//! Detection metrics collection and reporting

use flowguard_core::ClassificationResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const RECORDS_TOTAL: &str = "flowguard_records_total";
pub const ATTACKS_TOTAL: &str = "flowguard_attacks_total";
pub const BATCHES_TOTAL: &str = "flowguard_batches_total";
pub const DEGRADED_TOTAL: &str = "flowguard_degraded_total";
pub const BATCH_LATENCY_US: &str = "flowguard_batch_latency_us";

/// Register descriptions with whatever `metrics` recorder is installed
pub fn describe_metrics() {
    metrics::describe_counter!(RECORDS_TOTAL, "Total number of flow records classified");
    metrics::describe_counter!(ATTACKS_TOTAL, "Total number of records labeled Attack");
    metrics::describe_counter!(BATCHES_TOTAL, "Total number of committed batches");
    metrics::describe_counter!(
        DEGRADED_TOTAL,
        "Attacks whose category could not be determined"
    );
    metrics::describe_histogram!(
        BATCH_LATENCY_US,
        metrics::Unit::Microseconds,
        "Batch classification latency in microseconds"
    );
}

/// In-process detection counters
#[derive(Clone)]
pub struct DetectionMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    records: AtomicU64,
    attacks: AtomicU64,
    degraded: AtomicU64,
    batches: AtomicU64,
    batch_latency_us: AtomicU64,
    /// Sum of attack risk scores in hundredths
    attack_risk_centi: AtomicU64,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                records: AtomicU64::new(0),
                attacks: AtomicU64::new(0),
                degraded: AtomicU64::new(0),
                batches: AtomicU64::new(0),
                batch_latency_us: AtomicU64::new(0),
                attack_risk_centi: AtomicU64::new(0),
            }),
        }
    }

    /// Record one classified record
    pub fn record_result(&self, result: &ClassificationResult) {
        self.inner.records.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(RECORDS_TOTAL).increment(1);

        if result.is_attack() {
            self.inner.attacks.fetch_add(1, Ordering::Relaxed);
            self.inner
                .attack_risk_centi
                .fetch_add((result.risk_score * 100.0).round() as u64, Ordering::Relaxed);
            metrics::counter!(ATTACKS_TOTAL, "attack_type" => result.attack_type.clone())
                .increment(1);
        }
        if result.is_degraded() {
            self.inner.degraded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(DEGRADED_TOTAL).increment(1);
        }
    }

    /// Record one committed batch
    pub fn record_batch(&self, latency_us: u64) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        self.inner
            .batch_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        metrics::counter!(BATCHES_TOTAL).increment(1);
        metrics::histogram!(BATCH_LATENCY_US).record(latency_us as f64);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records: self.inner.records.load(Ordering::Relaxed),
            attacks: self.inner.attacks.load(Ordering::Relaxed),
            degraded: self.inner.degraded.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            batch_latency_us: self.inner.batch_latency_us.load(Ordering::Relaxed),
            attack_risk_sum: self.inner.attack_risk_centi.load(Ordering::Relaxed) as f64 / 100.0,
        }
    }
}

impl Default for DetectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub records: u64,
    pub attacks: u64,
    pub degraded: u64,
    pub batches: u64,
    pub batch_latency_us: u64,
    pub attack_risk_sum: f64,
}

impl MetricsSnapshot {
    pub fn normal(&self) -> u64 {
        self.records - self.attacks
    }

    /// Average latency per batch
    pub fn avg_batch_latency_us(&self) -> u64 {
        if self.batches == 0 {
            0
        } else {
            self.batch_latency_us / self.batches
        }
    }

    /// Fraction of records labeled Attack
    pub fn attack_rate(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.attacks as f64 / self.records as f64
        }
    }

    /// Mean risk score over attacks, rounded to two decimals
    pub fn mean_attack_risk(&self) -> Option<f64> {
        if self.attacks == 0 {
            None
        } else {
            Some((self.attack_risk_sum / self.attacks as f64 * 100.0).round() / 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_core::{CategoryStatus, Label, Severity};

    fn result(label: Label, risk: f64, status: CategoryStatus) -> ClassificationResult {
        ClassificationResult {
            label,
            attack_probability: risk / 100.0,
            risk_score: risk,
            severity: Severity::Low,
            attack_type: "DoS".to_string(),
            category_status: status,
        }
    }

    #[test]
    fn test_metrics_collection() {
        let metrics = DetectionMetrics::new();

        metrics.record_result(&result(Label::Attack, 35.0, CategoryStatus::Predicted));
        metrics.record_result(&result(Label::Attack, 92.0, CategoryStatus::TimedOut));
        metrics.record_result(&result(Label::Normal, 4.0, CategoryStatus::Skipped));
        metrics.record_batch(5000);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records, 3);
        assert_eq!(snapshot.attacks, 2);
        assert_eq!(snapshot.normal(), 1);
        assert_eq!(snapshot.degraded, 1);
        assert_eq!(snapshot.avg_batch_latency_us(), 5000);
        assert_eq!(snapshot.mean_attack_risk(), Some(63.5));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = DetectionMetrics::new();
        let clone = metrics.clone();
        clone.record_batch(10);
        assert_eq!(metrics.snapshot().batches, 1);
        assert_eq!(metrics.snapshot().mean_attack_risk(), None);
    }
}
