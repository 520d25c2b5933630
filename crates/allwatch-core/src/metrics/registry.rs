//! Central metrics registry.
//!
//! Counters for the change pipeline (raw changes, fetches, store mutations)
//! and for delivery to watchers, with export to Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::store::Mutation;

/// Central registry for all metrics.
pub struct MetricsRegistry {
    /// Registry creation time.
    started_at: Instant,

    // Change pipeline
    changes_received: AtomicU64,
    changes_ignored: AtomicU64,
    fetch_failures: AtomicU64,

    // Store mutations
    adds: AtomicU64,
    updates: AtomicU64,
    tombstones: AtomicU64,
    deletes: AtomicU64,
    unchanged: AtomicU64,
    tombstones_released: AtomicU64,

    // Delivery
    batches_delivered: AtomicU64,
    deltas_delivered: AtomicU64,
    watchers_subscribed: AtomicU64,
    watchers_stopped: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            changes_received: AtomicU64::new(0),
            changes_ignored: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            adds: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            tombstones: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            tombstones_released: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            deltas_delivered: AtomicU64::new(0),
            watchers_subscribed: AtomicU64::new(0),
            watchers_stopped: AtomicU64::new(0),
        }
    }

    /// Record a raw change handed to the coordinator.
    pub fn record_change(&self) {
        self.changes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a raw change for an untracked collection.
    pub fn record_ignored_change(&self) {
        self.changes_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed fetch attempt.
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a store mutation.
    pub fn record_mutation(&self, mutation: Mutation) {
        let counter = match mutation {
            Mutation::Added => &self.adds,
            Mutation::Updated => &self.updates,
            Mutation::Tombstoned => &self.tombstones,
            Mutation::Deleted => &self.deletes,
            Mutation::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tombstone deleted after its last reference went away.
    pub fn record_tombstone_released(&self) {
        self.tombstones_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch delivered to a watcher.
    pub fn record_batch(&self, deltas: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.deltas_delivered.fetch_add(deltas as u64, Ordering::Relaxed);
    }

    /// Record a new watcher.
    pub fn record_subscribe(&self) {
        self.watchers_subscribed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stopped watcher.
    pub fn record_stop(&self) {
        self.watchers_stopped.fetch_add(1, Ordering::Relaxed);
    }

    // Getters

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Get raw changes received.
    pub fn changes_received(&self) -> u64 {
        self.changes_received.load(Ordering::Relaxed)
    }

    /// Get raw changes ignored.
    pub fn changes_ignored(&self) -> u64 {
        self.changes_ignored.load(Ordering::Relaxed)
    }

    /// Get failed fetch attempts.
    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    /// Get store mutations that advanced the revision counter.
    pub fn mutation_count(&self) -> u64 {
        self.adds.load(Ordering::Relaxed)
            + self.updates.load(Ordering::Relaxed)
            + self.tombstones.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
    }

    /// Get updates that carried no new information.
    pub fn unchanged_count(&self) -> u64 {
        self.unchanged.load(Ordering::Relaxed)
    }

    /// Get tombstones released by the last reference.
    pub fn tombstones_released(&self) -> u64 {
        self.tombstones_released.load(Ordering::Relaxed)
    }

    /// Get batches delivered.
    pub fn batches_delivered(&self) -> u64 {
        self.batches_delivered.load(Ordering::Relaxed)
    }

    /// Get deltas delivered.
    pub fn deltas_delivered(&self) -> u64 {
        self.deltas_delivered.load(Ordering::Relaxed)
    }

    /// Get watchers currently subscribed.
    pub fn active_watchers(&self) -> u64 {
        self.watchers_subscribed
            .load(Ordering::Relaxed)
            .saturating_sub(self.watchers_stopped.load(Ordering::Relaxed))
    }

    /// Export to Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP allwatch_{} {}\n", name, help));
            out.push_str(&format!("# TYPE allwatch_{} {}\n", name, kind));
            out.push_str(&format!("allwatch_{} {}\n\n", name, value));
        };

        metric("uptime_seconds", "gauge", "Uptime in seconds", self.uptime_secs());
        metric(
            "changes_total",
            "counter",
            "Raw changes received",
            self.changes_received(),
        );
        metric(
            "changes_ignored_total",
            "counter",
            "Raw changes for untracked collections",
            self.changes_ignored(),
        );
        metric(
            "fetch_failures_total",
            "counter",
            "Failed backing fetch attempts",
            self.fetch_failures(),
        );
        metric(
            "store_mutations_total",
            "counter",
            "Store mutations that advanced the revision",
            self.mutation_count(),
        );
        metric(
            "store_unchanged_total",
            "counter",
            "Updates that carried no new information",
            self.unchanged_count(),
        );
        metric(
            "tombstones_released_total",
            "counter",
            "Tombstones deleted after their last reference",
            self.tombstones_released(),
        );
        metric(
            "batches_total",
            "counter",
            "Batches delivered to watchers",
            self.batches_delivered(),
        );
        metric(
            "deltas_total",
            "counter",
            "Deltas delivered to watchers",
            self.deltas_delivered(),
        );
        metric(
            "watchers",
            "gauge",
            "Currently subscribed watchers",
            self.active_watchers(),
        );

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics registry handle.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Create a new shared metrics registry.
pub fn new_shared_registry() -> SharedMetricsRegistry {
    Arc::new(MetricsRegistry::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_mutations() {
        let registry = MetricsRegistry::new();
        registry.record_mutation(Mutation::Added);
        registry.record_mutation(Mutation::Updated);
        registry.record_mutation(Mutation::Deleted);
        registry.record_mutation(Mutation::Unchanged);

        assert_eq!(registry.mutation_count(), 3);
        assert_eq!(registry.unchanged_count(), 1);
    }

    #[test]
    fn test_watchers_gauge() {
        let registry = MetricsRegistry::new();
        registry.record_subscribe();
        registry.record_subscribe();
        registry.record_stop();

        assert_eq!(registry.active_watchers(), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let registry = MetricsRegistry::new();
        registry.record_change();
        registry.record_batch(4);

        let text = registry.to_prometheus();
        assert!(text.contains("# TYPE allwatch_changes_total counter"));
        assert!(text.contains("allwatch_changes_total 1\n"));
        assert!(text.contains("allwatch_batches_total 1\n"));
        assert!(text.contains("allwatch_deltas_total 4\n"));
    }
}
