use crate::config::AppConfig;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ── Request Counters (lock-free) ──

pub struct PerfCounters {
    pub requests_served: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub requests_failed: AtomicU64,
    /// Lattices rolled back on behalf of successful requests.
    pub lattice_evaluations: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            requests_served: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            lattice_evaluations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_lattices(&self, count: u64) {
        self.lattice_evaluations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests_served: self.requests_served.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            lattice_evaluations: self.lattice_evaluations.load(Ordering::Relaxed),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CounterSnapshot {
    pub requests_served: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
    pub lattice_evaluations: u64,
}

// ── Application shared state (no locks; every request is independent) ──

pub struct AppState {
    pub config: AppConfig,
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            counters: PerfCounters::new(),
        })
    }
}
