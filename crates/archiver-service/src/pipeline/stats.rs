use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running outcome counters for one controller
#[derive(Debug, Default)]
pub struct PipelineStats {
    pulled: AtomicU64,
    stored: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
    excess_nacked: AtomicU64,
    disposition_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pulled: u64,
    pub stored: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    pub excess_nacked: u64,
    pub disposition_failures: u64,
}

impl PipelineStats {
    pub fn record_pulled(&self, count: usize) {
        self.pulled.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nacked(&self) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_excess_nacked(&self) {
        self.excess_nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disposition_failure(&self) {
        self.disposition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pulled: self.pulled.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            excess_nacked: self.excess_nacked.load(Ordering::Relaxed),
            disposition_failures: self.disposition_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Messages that reached a terminal disposition.
    pub fn disposed(&self) -> u64 {
        self.acked + self.nacked
    }
}
