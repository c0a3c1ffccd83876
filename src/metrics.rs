use std::collections::BTreeMap;
use std::sync::Mutex;

use log::debug;
use serde::Serialize;

/// Receives observations produced while reconciling jobs.
///
/// Implementations must not block; they are called inline by the reconciler.
pub trait MetricsSink: Send + Sync {
    /// Time a job spent queued before it started, keyed by its runner labels.
    fn observe_queue_duration(&self, label: &str, seconds: f64);

    /// Outcome of a completed job (e.g., "success", "failure").
    fn observe_conclusion(&self, outcome: &str);
}

/// Queue-duration samples for one runner label set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueDurations {
    pub count: u64,
    pub sum_seconds: f64,
    pub max_seconds: f64,
}

/// Point-in-time copy of everything recorded so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_durations: BTreeMap<String, QueueDurations>,
    pub conclusions: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.queue_durations.is_empty() && self.conclusions.is_empty()
    }
}

/// In-process recorder, shared by `Arc` between the reconciler and whatever
/// exports the numbers.
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<MetricsSnapshot>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for Metrics {
    fn observe_queue_duration(&self, label: &str, seconds: f64) {
        debug!("Queue duration for [{label}]: {seconds:.1}s");

        if let Ok(mut inner) = self.inner.lock() {
            let entry = inner.queue_durations.entry(label.to_string()).or_default();
            entry.count += 1;
            entry.sum_seconds += seconds;
            entry.max_seconds = entry.max_seconds.max(seconds);
        }
    }

    fn observe_conclusion(&self, outcome: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.conclusions.entry(outcome.to_string()).or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_durations_accumulate() {
        let metrics = Metrics::new();
        metrics.observe_queue_duration("ubuntu-latest", 30.0);
        metrics.observe_queue_duration("ubuntu-latest", 90.0);
        metrics.observe_queue_duration("self-hosted,arm64", 5.0);

        let snapshot = metrics.snapshot();
        let ubuntu = &snapshot.queue_durations["ubuntu-latest"];
        assert_eq!(ubuntu.count, 2);
        assert!((ubuntu.sum_seconds - 120.0).abs() < f64::EPSILON);
        assert!((ubuntu.max_seconds - 90.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.queue_durations["self-hosted,arm64"].count, 1);
    }

    #[test]
    fn test_conclusions_count() {
        let metrics = Metrics::new();
        assert!(metrics.snapshot().is_empty());

        metrics.observe_conclusion("success");
        metrics.observe_conclusion("failure");
        metrics.observe_conclusion("success");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conclusions["success"], 2);
        assert_eq!(snapshot.conclusions["failure"], 1);
    }
}
