//! In-process metrics store.
//!
//! Mirrors what goes to the `metrics` facade so the collaborator layer can
//! export a snapshot without a recorder.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::metrics::{Operation, Outcome};

/// Latency statistics for one operation, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    fn first(value: f64) -> Self {
        Self { count: 1, sum_ms: value, min_ms: value, max_ms: value }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum_ms += value;
        self.min_ms = self.min_ms.min(value);
        self.max_ms = self.max_ms.max(value);
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Keyed `<operation>.<outcome>`, e.g. `pause.ok`.
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    /// Keyed by operation name.
    pub latencies: HashMap<String, LatencySummary>,
}

impl MetricsSnapshot {
    pub fn counter(&self, operation: Operation, outcome: Outcome) -> u64 {
        self.counters
            .get(&counter_key(operation, outcome))
            .copied()
            .unwrap_or(0)
    }
}

fn counter_key(operation: Operation, outcome: Outcome) -> String {
    format!("{}.{}", operation.as_str(), outcome.as_str())
}

#[derive(Default)]
pub struct MetricsStore {
    counters: DashMap<String, u64>,
    gauges: DashMap<String, f64>,
    latencies: DashMap<&'static str, LatencySummary>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, operation: Operation, outcome: Outcome, latency_ms: f64) {
        *self.counters.entry(counter_key(operation, outcome)).or_insert(0) += 1;
        self.latencies
            .entry(operation.as_str())
            .and_modify(|s| s.observe(latency_ms))
            .or_insert_with(|| LatencySummary::first(latency_ms));
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|e| (e.key().clone(), *e.value())).collect(),
            gauges: self.gauges.iter().map(|e| (e.key().clone(), *e.value())).collect(),
            latencies: self
                .latencies
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_operation_and_outcome() {
        let store = MetricsStore::new();
        store.record_operation(Operation::Pause, Outcome::Ok, 2.0);
        store.record_operation(Operation::Pause, Outcome::Ok, 4.0);
        store.record_operation(Operation::Pause, Outcome::Rejected, 0.5);

        let snap = store.snapshot();
        assert_eq!(snap.counter(Operation::Pause, Outcome::Ok), 2);
        assert_eq!(snap.counter(Operation::Pause, Outcome::Rejected), 1);
        assert_eq!(snap.counter(Operation::Resume, Outcome::Ok), 0);

        let pause = snap.latencies["pause"];
        assert_eq!(pause.count, 3);
        assert_eq!(pause.min_ms, 0.5);
        assert_eq!(pause.max_ms, 4.0);
        assert!((pause.mean_ms() - 6.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_gauge_overwrites() {
        let store = MetricsStore::new();
        store.set_gauge("active", 3.0);
        store.set_gauge("active", 1.0);
        assert_eq!(store.snapshot().gauges["active"], 1.0);
    }
}
