// Operation metrics module
//
// Counts what happened during a run by listening to state change events

use crate::models::{InstallPhase, Operation};
use crate::state::StateChange;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Fed from the [`StateManager`](crate::state::StateManager) event stream via
/// [`observe`](Self::observe) and logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Installs that reached `Installed`
    pub installs_completed: AtomicUsize,

    /// Installs that ended in `Failed`
    pub installs_failed: AtomicUsize,

    /// Transitions into `Linked`
    pub redirects_created: AtomicUsize,

    /// Download batches handed to the helper
    pub batches_started: AtomicUsize,

    /// Items across all batches, duplicates included
    pub items_requested: AtomicU64,

    pub cache_clears: AtomicUsize,

    /// Ids whose helper metadata was purged after deletion
    pub items_purged: AtomicU64,

    /// Number of events observed
    pub events_observed: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            installs_completed: AtomicUsize::new(0),
            installs_failed: AtomicUsize::new(0),
            redirects_created: AtomicUsize::new(0),
            batches_started: AtomicUsize::new(0),
            items_requested: AtomicU64::new(0),
            cache_clears: AtomicUsize::new(0),
            items_purged: AtomicU64::new(0),
            events_observed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Update the counters for one state change
    pub fn observe(&self, change: &StateChange) {
        self.events_observed.fetch_add(1, Ordering::Relaxed);

        match change {
            StateChange::PhaseChanged {
                phase: InstallPhase::Installed,
            } => {
                self.installs_completed.fetch_add(1, Ordering::Relaxed);
            }
            StateChange::PhaseChanged {
                phase: InstallPhase::Failed,
            } => {
                self.installs_failed.fetch_add(1, Ordering::Relaxed);
            }
            StateChange::PhaseChanged {
                phase: InstallPhase::Linked,
            } => {
                self.redirects_created.fetch_add(1, Ordering::Relaxed);
            }
            StateChange::OperationStarted {
                operation: Operation::Download,
                items,
            } => self.record_batch(*items),
            StateChange::DepotCacheCleared => {
                self.cache_clears.fetch_add(1, Ordering::Relaxed);
            }
            StateChange::ItemsPurged { ids } => {
                self.items_purged
                    .fetch_add(ids.len() as u64, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_batch(&self, items: usize) {
        self.batches_started.fetch_add(1, Ordering::Relaxed);
        self.items_requested
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Installs: {} completed, {} failed, {} linked",
            self.installs_completed.load(Ordering::Relaxed),
            self.installs_failed.load(Ordering::Relaxed),
            self.redirects_created.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Downloads: {} batches, {} items requested",
            self.batches_started.load(Ordering::Relaxed),
            self.items_requested.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Depot cache clears: {}, purged items: {}, events: {}",
            self.cache_clears.load(Ordering::Relaxed),
            self.items_purged.load(Ordering::Relaxed),
            self.events_observed.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
