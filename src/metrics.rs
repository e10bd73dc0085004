//! Producer observability counters.
//!
//! Atomic counters for lock-free updates, mirrored to the `metrics` crate
//! facade so any installed exporter (Prometheus etc.) sees them too.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked by the producer.
#[derive(Debug, Default)]
pub struct CdcMetrics {
    /// Mutations acknowledged by the bus
    sent_mutations: AtomicU64,
    /// Failed send attempts
    sent_errors: AtomicU64,
    /// Mutations dropped for unsupported primary-key column types
    skipped_mutations: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sent_mutations: u64,
    pub sent_errors: u64,
    pub skipped_mutations: u64,
}

impl CdcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_sent_mutation(&self) {
        self.sent_mutations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tidelog_sent_mutations_total").increment(1);
    }

    #[inline]
    pub fn record_sent_error(&self) {
        self.sent_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tidelog_sent_errors_total").increment(1);
    }

    #[inline]
    pub fn record_skipped_mutation(&self) {
        self.skipped_mutations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tidelog_skipped_mutations_total").increment(1);
    }

    pub fn sent_mutations(&self) -> u64 {
        self.sent_mutations.load(Ordering::Relaxed)
    }

    pub fn sent_errors(&self) -> u64 {
        self.sent_errors.load(Ordering::Relaxed)
    }

    pub fn skipped_mutations(&self) -> u64 {
        self.skipped_mutations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent_mutations: self.sent_mutations(),
            sent_errors: self.sent_errors(),
            skipped_mutations: self.skipped_mutations(),
        }
    }
}
