//! Counters for hub and producer activity

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::coordinator::ProducerState;

/// Shared counters, updated lock-free from the broadcast path and producers
#[derive(Debug, Default)]
pub struct HubMetrics {
    samples_broadcast: AtomicU64,
    deliveries: AtomicU64,
    overflow_drops: AtomicU64,
    records_forwarded: AtomicU64,
    records_rejected: AtomicU64,
    synthetic_starts: AtomicU64,
    external_starts: AtomicU64,
    spawn_failures: AtomicU64,
    external_exits: AtomicU64,
    forced_kills: AtomicU64,
}

macro_rules! counter {
    ($incr:ident, $get:ident, $field:ident) => {
        pub(crate) fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one broadcast that reached `delivered` channels, `dropped` of
    /// which had to evict their oldest sample
    pub(crate) fn record_broadcast(&self, delivered: u64, dropped: u64) {
        self.samples_broadcast.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        if dropped > 0 {
            self.overflow_drops.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    pub fn samples_broadcast(&self) -> u64 {
        self.samples_broadcast.load(Ordering::Relaxed)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    counter!(incr_records_forwarded, records_forwarded, records_forwarded);
    counter!(incr_records_rejected, records_rejected, records_rejected);
    counter!(incr_synthetic_starts, synthetic_starts, synthetic_starts);
    counter!(incr_external_starts, external_starts, external_starts);
    counter!(incr_spawn_failures, spawn_failures, spawn_failures);
    counter!(incr_external_exits, external_exits, external_exits);
    counter!(incr_forced_kills, forced_kills, forced_kills);
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStats {
    /// Which producer is feeding the hub
    pub state: ProducerState,
    /// Registered subscribers
    pub subscriber_count: usize,
    /// Samples handed to `broadcast`
    pub samples_broadcast: u64,
    /// Sum of per-subscriber deliveries
    pub deliveries: u64,
    /// Samples evicted from full subscriber queues
    pub overflow_drops: u64,
    /// External records decoded and broadcast
    pub records_forwarded: u64,
    /// External lines that failed to decode
    pub records_rejected: u64,
    /// Times the synthetic generator was started
    pub synthetic_starts: u64,
    /// Times an external process was started
    pub external_starts: u64,
    /// External commands that failed to spawn
    pub spawn_failures: u64,
    /// External processes that exited without being asked to
    pub external_exits: u64,
    /// External processes that had to be killed after the grace period
    pub forced_kills: u64,
}

impl HubStats {
    pub(crate) fn collect(metrics: &HubMetrics, state: ProducerState, subscriber_count: usize) -> Self {
        Self {
            state,
            subscriber_count,
            samples_broadcast: metrics.samples_broadcast(),
            deliveries: metrics.deliveries(),
            overflow_drops: metrics.overflow_drops(),
            records_forwarded: metrics.records_forwarded(),
            records_rejected: metrics.records_rejected(),
            synthetic_starts: metrics.synthetic_starts(),
            external_starts: metrics.external_starts(),
            spawn_failures: metrics.spawn_failures(),
            external_exits: metrics.external_exits(),
            forced_kills: metrics.forced_kills(),
        }
    }
}
