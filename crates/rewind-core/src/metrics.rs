//! Process-wide counters for orchestration activity.
//!
//! Counters are bumped at the call site with relaxed atomics. Call
//! [`Metrics::flush`] at a natural boundary (end of a workflow, CLI exit)
//! to emit every value as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    delegations: AtomicU64,
    failures: AtomicU64,
    lookups_missed: AtomicU64,
    parallel_batches: AtomicU64,
    events_published: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            delegations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            lookups_missed: AtomicU64::new(0),
            parallel_batches: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
        }
    }

    /// A request was handed to a registered agent.
    pub fn inc_delegations(&self) {
        self.delegations.fetch_add(1, Ordering::Relaxed);
    }

    /// A delegated request came back with `success = false`.
    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A delegation named an unregistered agent.
    pub fn inc_lookups_missed(&self) {
        self.lookups_missed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_parallel_batches(&self) {
        self.parallel_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            delegations = self.delegations(),
            failures = self.failures(),
            lookups_missed = self.lookups_missed(),
            parallel_batches = self.parallel_batches(),
            events_published = self.events_published(),
        );
    }

    pub fn delegations(&self) -> u64 {
        self.delegations.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn lookups_missed(&self) -> u64 {
        self.lookups_missed.load(Ordering::Relaxed)
    }

    pub fn parallel_batches(&self) -> u64 {
        self.parallel_batches.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
