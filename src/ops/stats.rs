//! Statistics store.
//!
//! Shared atomic counters written by the reconcile loop and read by the
//! control surface. Counters only ever increase; the last apply error is
//! kept verbatim so operators can see why the hardware configuration is
//! lagging the desired state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared statistics store.
#[derive(Debug, Default)]
pub struct StatsStore {
    cycles: AtomicU64,
    applies: AtomicU64,
    apply_errors: AtomicU64,
    last_apply_error: Mutex<Option<String>>,
}

/// Snapshot of the general statistics, served at `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralStats {
    /// Reconcile cycles observed since startup.
    pub cycles: u64,
    /// Successful hardware applications.
    pub applies: u64,
    /// Failed hardware applications.
    pub apply_errors: u64,
    /// Most recent apply failure, if any.
    pub last_apply_error: Option<String>,
}

impl StatsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reconcile cycle.
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful hardware application.
    pub fn record_apply(&self) {
        self.applies.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed hardware application.
    pub fn record_apply_error(&self, message: impl Into<String>) {
        self.apply_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_apply_error.lock() = Some(message.into());
    }

    /// Snapshot the general statistics.
    pub fn general_stats(&self) -> GeneralStats {
        GeneralStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            applies: self.applies.load(Ordering::Relaxed),
            apply_errors: self.apply_errors.load(Ordering::Relaxed),
            last_apply_error: self.last_apply_error.lock().clone(),
        }
    }
}
