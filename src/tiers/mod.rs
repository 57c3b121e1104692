//! Workload tier classification and validation primitives.
//!
//! Every workload managed by cacheqos belongs to exactly one of three tiers.
//! The predicates in this module are the single gate used before a core or
//! PID is accepted into a pool or handed to the hardware allocator.

use crate::core::error::{QosError, QosResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Workload classification tier.
///
/// Tiers are mutually exclusive classification buckets; the ordinal carries
/// no meaning beyond identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Latency-sensitive production workloads.
    Production,
    /// Pre-production / staging workloads.
    PreProduction,
    /// Throughput-oriented best-effort workloads.
    BestEffort,
}

impl Tier {
    /// All tiers, in allocation-priority order.
    pub const ALL: [Tier; 3] = [Tier::Production, Tier::PreProduction, Tier::BestEffort];

    /// Stable wire/config name for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::PreProduction => "preproduction",
            Self::BestEffort => "besteffort",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "preproduction" => Ok(Self::PreProduction),
            "besteffort" => Ok(Self::BestEffort),
            other => Err(QosError::InvalidPool {
                message: format!("unknown tier: {other}"),
            }),
        }
    }
}

/// Membership of a single tier: the cores and PIDs assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Logical core identifiers owned by this tier.
    #[serde(default)]
    pub cores: BTreeSet<u32>,

    /// Process identifiers pinned to this tier.
    #[serde(default)]
    pub pids: BTreeSet<u32>,
}

impl Pool {
    /// Create a pool from core and PID lists.
    pub fn new(
        cores: impl IntoIterator<Item = u32>,
        pids: impl IntoIterator<Item = u32>,
    ) -> Self {
        Self {
            cores: cores.into_iter().collect(),
            pids: pids.into_iter().collect(),
        }
    }

    /// Check whether the pool has no members at all.
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty() && self.pids.is_empty()
    }
}

/// The full desired tier membership: one pool per tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPools {
    #[serde(default)]
    pub production: Pool,

    #[serde(default)]
    pub preproduction: Pool,

    #[serde(default)]
    pub besteffort: Pool,
}

impl TierPools {
    /// Get the pool for a tier.
    pub fn pool(&self, tier: Tier) -> &Pool {
        match tier {
            Tier::Production => &self.production,
            Tier::PreProduction => &self.preproduction,
            Tier::BestEffort => &self.besteffort,
        }
    }

    /// Get a mutable reference to the pool for a tier.
    pub fn pool_mut(&mut self, tier: Tier) -> &mut Pool {
        match tier {
            Tier::Production => &mut self.production,
            Tier::PreProduction => &mut self.preproduction,
            Tier::BestEffort => &mut self.besteffort,
        }
    }

    /// Iterate over (tier, pool) pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &Pool)> {
        Tier::ALL.iter().map(move |&tier| (tier, self.pool(tier)))
    }

    /// Validate pool membership against the host.
    ///
    /// Every core must be valid for a host with `core_count` logical cores,
    /// and no core or PID may belong to more than one tier.
    pub fn validate(&self, core_count: usize) -> QosResult<()> {
        for (_, pool) in self.iter() {
            for &core in &pool.cores {
                if !is_core_valid(core, core_count) {
                    return Err(QosError::InvalidCore { core, core_count });
                }
            }
        }
        self.validate_disjoint()
    }

    /// Check that no core or PID is a member of more than one pool.
    pub fn validate_disjoint(&self) -> QosResult<()> {
        let mut seen_cores: BTreeSet<u32> = BTreeSet::new();
        let mut seen_pids: BTreeSet<u32> = BTreeSet::new();

        for (tier, pool) in self.iter() {
            for &core in &pool.cores {
                if !seen_cores.insert(core) {
                    return Err(QosError::InvalidPool {
                        message: format!("core {core} assigned to more than one tier ({tier})"),
                    });
                }
            }
            for &pid in &pool.pids {
                if !seen_pids.insert(pid) {
                    return Err(QosError::InvalidPool {
                        message: format!("pid {pid} assigned to more than one tier ({tier})"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Number of logical cores on this host, introspected once at startup.
pub fn host_core_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Check core identifier validity against the host core count.
///
/// A core is valid only when it is strictly below `core_count`. Invalid
/// input is a normal, reportable case for callers, never a fault.
pub fn is_core_valid(core: u32, core_count: usize) -> bool {
    (core as usize) < core_count
}

/// Cross-context shutdown flag.
///
/// Set exactly once per process lifetime (idempotent thereafter), safe to
/// set from an asynchronous signal context, safe to poll without blocking.
/// Only the flag is touched on the signal path; logging and cleanup happen
/// on the reconcile loop's own context after it observes the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Create a new, unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Observe the signal without blocking.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Liveness-tolerant signal check.
///
/// An absent signal is treated as "not yet requested to stop" rather than
/// a fault, so callers never need to handle an unreadable signal object.
pub fn is_signal_set(signal: Option<&ShutdownSignal>) -> bool {
    signal.is_some_and(ShutdownSignal::is_set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_names_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn pool_mut_targets_the_right_tier() {
        let mut pools = TierPools::default();
        pools.pool_mut(Tier::BestEffort).cores.insert(3);
        assert!(pools.besteffort.cores.contains(&3));
        assert!(pools.production.cores.is_empty());
    }
}
