//! Counters emitted by the duplicate detector.
//!
//! | Metric | Labels | Meaning |
//! |--------|--------|---------|
//! | `duplication_candidates_total` | `outcome` | one per classified candidate |
//! | `duplication_scans_total` | `result` | one per finished or aborted scan |

use parking_lot::Mutex;
use std::collections::HashMap;

use super::classification::Classification;

/// Metric name for per-candidate classification counts.
pub const CANDIDATES_METRIC: &str = "duplication_candidates_total";

/// Metric name for per-scan counts.
pub const SCANS_METRIC: &str = "duplication_scans_total";

/// Sink for detector counters.
pub trait DetectionMetrics: Send + Sync {
    /// Increment a counter by 1.
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]);

    /// Record one classification.
    fn record_classification(&self, classification: &Classification) {
        self.increment(CANDIDATES_METRIC, &[("outcome", classification.label())]);
    }

    /// Record the end of a scan.
    fn record_scan(&self, succeeded: bool) {
        let result = if succeeded { "ok" } else { "error" };
        self.increment(SCANS_METRIC, &[("result", result)]);
    }
}

/// Metrics sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl DetectionMetrics for NoOpMetrics {
    fn increment(&self, _metric_name: &str, _labels: &[(&str, &str)]) {}
}

/// In-memory metrics for testing.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values keyed by name and labels.
    pub counters: Mutex<HashMap<String, u64>>,
}

impl DetectionMetrics for TestMetrics {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        let key = format!("{}:{:?}", metric_name, labels);
        *self.counters.lock().entry(key).or_insert(0) += 1;
    }
}

impl TestMetrics {
    /// Sum of a metric over all label sets.
    pub fn get_count(&self, metric_name: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(metric_name))
            .map(|(_, v)| v)
            .sum()
    }

    /// Value of a metric for one label value.
    pub fn get_labeled(&self, metric_name: &str, label_value: &str) -> u64 {
        let needle = format!("\"{}\"", label_value);
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(metric_name) && k.contains(&needle))
            .map(|(_, v)| v)
            .sum()
    }
}
