//! Reconciliation loop.
//!
//! Keeps the live hardware configuration in sync with the desired-state
//! store. The loop applies the full pool set once on entry, then each
//! cycle checks the shutdown flag, compares the store's change marker to
//! its last observation, re-applies on change, and sleeps for a fixed
//! interval. Both checks happen before the sleep so a shutdown request
//! takes effect with at most one interval of latency.

use crate::core::config::ConfigStore;
use crate::core::error::QosResult;
use crate::hw::allocator::CacheAllocator;
use crate::ops::stats::StatsStore;
use crate::tiers::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;

/// Default poll interval between reconcile cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// First application has not completed yet.
    Initializing,
    /// Polling the store and reapplying on change.
    SteadyState,
    /// Shutdown observed; control returned to the orchestrator.
    Terminated,
}

/// The reconciliation loop.
pub struct ReconcileLoop {
    store: Arc<ConfigStore>,
    stats: Arc<StatsStore>,
    shutdown: ShutdownSignal,
    interval: Duration,
    last_generation: u64,
    state: LoopState,
}

impl ReconcileLoop {
    /// Create a loop over the given store with the default poll interval.
    pub fn new(store: Arc<ConfigStore>, stats: Arc<StatsStore>, shutdown: ShutdownSignal) -> Self {
        Self {
            store,
            stats,
            shutdown,
            interval: POLL_INTERVAL,
            last_generation: 0,
            state: LoopState::Initializing,
        }
    }

    /// Override the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the shutdown signal is observed.
    ///
    /// The first application is unconditional: the change marker has no
    /// prior observation to compare against, and a daemon must never run
    /// with unapplied hardware state. A first-application failure is
    /// startup-fatal and propagates to the orchestrator. Later failures
    /// are logged and counted; the hardware keeps its last successfully
    /// applied configuration and the loop continues polling.
    pub async fn run(&mut self, allocator: &mut dyn CacheAllocator) -> QosResult<()> {
        // Marker before pools: a write racing this snapshot is then seen
        // as a change on the next cycle instead of being lost.
        self.last_generation = self.store.generation();
        let pools = self.store.pools();
        allocator.apply(&pools)?;
        self.stats.record_apply();
        self.state = LoopState::SteadyState;
        tracing::info!(generation = self.last_generation, "initial configuration applied");

        while !self.shutdown.is_set() {
            self.stats.record_cycle();

            let generation = self.store.generation();
            if generation != self.last_generation {
                tracing::info!(generation, "configuration changed");
                let pools = self.store.pools();
                match allocator.apply(&pools) {
                    Ok(()) => self.stats.record_apply(),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "apply failed; keeping last applied configuration"
                        );
                        self.stats.record_apply_error(e.to_string());
                    }
                }
                self.last_generation = generation;
            }

            tracing::debug!(stats = ?self.stats.general_stats(), "reconcile cycle");
            tokio::time::sleep(self.interval).await;
        }

        self.state = LoopState::Terminated;
        tracing::info!("reconcile loop terminated");
        Ok(())
    }
}
