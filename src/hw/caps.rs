//! Hardware capability detection and the startup gate.
//!
//! The gate runs exactly once, before any reconciliation work. There is no
//! degraded mode: a missing required capability terminates the daemon
//! before the control surface is ever started. Capability loss after
//! startup is treated as an unrecoverable host condition and not re-checked.

use crate::core::error::{QosError, QosResult};
use serde::{Deserialize, Serialize};

/// Cache and bandwidth partitioning capabilities of this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// L3 cache allocation (CAT) is available.
    pub l3_cat: bool,

    /// Memory bandwidth allocation (MBA) is available.
    pub mba: bool,

    /// Number of allocatable L3 cache ways.
    pub cache_ways: u32,

    /// Minimum number of consecutive ways a mask must contain.
    pub min_cbm_bits: u32,
}

impl Capabilities {
    /// Capabilities of a host with no partitioning support.
    pub fn none() -> Self {
        Self {
            l3_cat: false,
            mba: false,
            cache_ways: 0,
            min_cbm_bits: 0,
        }
    }
}

/// One-shot startup capability gate.
///
/// L3 CAT is always required; MBA only when bandwidth control is enabled
/// in the configuration. On failure the orchestrator must terminate the
/// process without starting the control surface or the loop.
pub fn check_capabilities(caps: &Capabilities, require_mba: bool) -> QosResult<()> {
    if !caps.l3_cat {
        return Err(QosError::capability("l3 cache allocation (cat)"));
    }
    if caps.cache_ways < 3 {
        return Err(QosError::capability(format!(
            "at least 3 allocatable cache ways (host exposes {})",
            caps.cache_ways
        )));
    }
    if require_mba && !caps.mba {
        return Err(QosError::capability("memory bandwidth allocation (mba)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_caps() -> Capabilities {
        Capabilities {
            l3_cat: true,
            mba: true,
            cache_ways: 12,
            min_cbm_bits: 1,
        }
    }

    #[test]
    fn gate_passes_with_cat_present() {
        assert!(check_capabilities(&full_caps(), false).is_ok());
    }

    #[test]
    fn gate_rejects_missing_cat() {
        let caps = Capabilities {
            l3_cat: false,
            ..full_caps()
        };
        let err = check_capabilities(&caps, false).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn gate_requires_mba_only_when_enabled() {
        let caps = Capabilities {
            mba: false,
            ..full_caps()
        };
        assert!(check_capabilities(&caps, false).is_ok());
        assert!(check_capabilities(&caps, true).is_err());
    }
}
