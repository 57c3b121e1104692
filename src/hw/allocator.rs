//! Hardware allocator.
//!
//! The [`CacheAllocator`] trait seams the reconcile loop off from the
//! platform. The production implementation programs Linux resctrl: one
//! group per tier, a contiguous L3 way mask per group, plus an MB throttle
//! line when bandwidth control is enabled. A recording mock backs the
//! loop and lifecycle tests.

use crate::core::config::{HardwareConfig, MbaShares, WayShares};
use crate::core::error::{QosError, QosResult};
use crate::hw::caps::Capabilities;
use crate::tiers::{Tier, TierPools};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hardware cache/bandwidth allocator interface.
///
/// `init` and `finalize` bracket the daemon lifetime; `capabilities` feeds
/// the one-shot startup gate; `apply` re-derives and programs the full
/// configuration for a pool set.
pub trait CacheAllocator: Send {
    /// Initialize the allocator. Startup-fatal on failure.
    fn init(&mut self) -> QosResult<()>;

    /// Detect host partitioning capabilities.
    fn capabilities(&self) -> QosResult<Capabilities>;

    /// Derive and apply the hardware configuration for the full pool set.
    fn apply(&mut self, pools: &TierPools) -> QosResult<()>;

    /// Release hardware resources. Called on every exit path after `init`.
    fn finalize(&mut self) -> QosResult<()>;
}

/// Per-tier L3 way bitmasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierMasks {
    pub production: u64,
    pub preproduction: u64,
    pub besteffort: u64,
}

impl TierMasks {
    /// Mask for a tier.
    pub fn mask(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Production => self.production,
            Tier::PreProduction => self.preproduction,
            Tier::BestEffort => self.besteffort,
        }
    }
}

/// Split the cache ways into three contiguous, non-overlapping masks.
///
/// Production takes its share from the most significant ways down,
/// pre-production the next block, and best-effort everything that remains.
/// Every tier gets at least `min_cbm_bits` ways (at least one); if the
/// cache cannot accommodate that, the host cannot express the partitioning.
pub fn derive_way_masks(
    cache_ways: u32,
    min_cbm_bits: u32,
    shares: &WayShares,
) -> QosResult<TierMasks> {
    if cache_ways == 0 || cache_ways > 64 {
        return Err(QosError::capability(format!(
            "unsupported cache way count: {cache_ways}"
        )));
    }
    let floor = min_cbm_bits.max(1);

    let ways_for = |share: u8| (cache_ways * share as u32 / 100).max(floor);
    let production_ways = ways_for(shares.production);
    let preproduction_ways = ways_for(shares.preproduction);

    let used = production_ways + preproduction_ways;
    if used + floor > cache_ways {
        return Err(QosError::capability(format!(
            "{cache_ways} cache ways cannot hold three tiers with min_cbm_bits={floor}"
        )));
    }
    let besteffort_ways = cache_ways - used;

    let block = |ways: u32, high: u32| -> u64 { ((1u64 << ways) - 1) << (high - ways) };
    Ok(TierMasks {
        production: block(production_ways, cache_ways),
        preproduction: block(preproduction_ways, cache_ways - production_ways),
        besteffort: block(besteffort_ways, besteffort_ways),
    })
}

/// Linux resctrl-backed allocator.
///
/// Owns one resctrl group per tier under the configured root. The group
/// names are stable so a restarted daemon adopts its own groups.
pub struct ResctrlAllocator {
    root: PathBuf,
    way_shares: WayShares,
    mba_shares: MbaShares,
    mba_enabled: bool,
    l3_domains: Vec<u32>,
    mb_domains: Vec<u32>,
    initialized: bool,
}

impl ResctrlAllocator {
    /// Create an allocator for the configured resctrl root.
    pub fn new(hardware: &HardwareConfig) -> Self {
        Self {
            root: PathBuf::from(&hardware.resctrl_root),
            way_shares: hardware.way_shares,
            mba_shares: hardware.mba_shares,
            mba_enabled: hardware.mba_enabled,
            l3_domains: Vec::new(),
            mb_domains: Vec::new(),
            initialized: false,
        }
    }

    fn group_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(format!("cacheqos_{tier}"))
    }

    fn read_trimmed(path: &Path) -> QosResult<String> {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| QosError::HardwareInit {
                message: format!("failed to read {}: {e}", path.display()),
            })
    }

    /// Parse the domain ids of one schemata resource line, e.g.
    /// `L3:0=fff;1=fff` yields `[0, 1]`.
    fn parse_domains(schemata: &str, resource: &str) -> Vec<u32> {
        let prefix = format!("{resource}:");
        schemata
            .lines()
            .find_map(|line| line.trim().strip_prefix(&prefix))
            .map(|rest| {
                rest.split(';')
                    .filter_map(|entry| entry.split('=').next())
                    .filter_map(|id| id.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn schemata_line(resource: &str, domains: &[u32], value: &str) -> String {
        let entries: Vec<String> = domains.iter().map(|d| format!("{d}={value}")).collect();
        format!("{resource}:{}\n", entries.join(";"))
    }

    fn write_group(&self, tier: Tier, mask: u64, pools: &TierPools) -> QosResult<()> {
        let dir = self.group_dir(tier);
        std::fs::create_dir_all(&dir).map_err(|e| {
            QosError::apply(format!("failed to create group {}: {e}", dir.display()))
        })?;

        let mut schemata =
            Self::schemata_line("L3", &self.l3_domains, &format!("{mask:x}"));
        if self.mba_enabled && !self.mb_domains.is_empty() {
            let throttle = self.mba_shares.share(tier);
            schemata.push_str(&Self::schemata_line(
                "MB",
                &self.mb_domains,
                &throttle.to_string(),
            ));
        }
        std::fs::write(dir.join("schemata"), schemata).map_err(|e| {
            QosError::apply(format!("failed to write {tier} schemata: {e}"))
        })?;

        let pool = pools.pool(tier);
        if !pool.cores.is_empty() {
            let cores: Vec<String> = pool.cores.iter().map(u32::to_string).collect();
            std::fs::write(dir.join("cpus_list"), cores.join(",")).map_err(|e| {
                QosError::apply(format!("failed to assign {tier} cores: {e}"))
            })?;
        }
        // resctrl accepts one pid per write to tasks
        for &pid in &pool.pids {
            std::fs::write(dir.join("tasks"), pid.to_string()).map_err(|e| {
                QosError::apply(format!("failed to assign pid {pid} to {tier}: {e}"))
            })?;
        }
        Ok(())
    }
}

impl CacheAllocator for ResctrlAllocator {
    fn init(&mut self) -> QosResult<()> {
        let schemata_path = self.root.join("schemata");
        if !schemata_path.exists() {
            return Err(QosError::HardwareInit {
                message: format!(
                    "resctrl filesystem not mounted at {}",
                    self.root.display()
                ),
            });
        }
        let schemata = Self::read_trimmed(&schemata_path)?;
        self.l3_domains = Self::parse_domains(&schemata, "L3");
        self.mb_domains = Self::parse_domains(&schemata, "MB");
        if self.l3_domains.is_empty() {
            return Err(QosError::HardwareInit {
                message: "no L3 domains in resctrl schemata".to_string(),
            });
        }
        self.initialized = true;
        tracing::info!(
            root = %self.root.display(),
            l3_domains = self.l3_domains.len(),
            mb_domains = self.mb_domains.len(),
            "resctrl allocator initialized"
        );
        Ok(())
    }

    fn capabilities(&self) -> QosResult<Capabilities> {
        let info = self.root.join("info");
        let l3_info = info.join("L3");
        if !l3_info.is_dir() {
            return Ok(Capabilities::none());
        }
        let cbm_mask = Self::read_trimmed(&l3_info.join("cbm_mask"))?;
        let cache_ways = u64::from_str_radix(&cbm_mask, 16)
            .map_err(|e| QosError::HardwareInit {
                message: format!("malformed cbm_mask {cbm_mask:?}: {e}"),
            })?
            .count_ones();
        let min_cbm_bits = Self::read_trimmed(&l3_info.join("min_cbm_bits"))?
            .parse()
            .map_err(|e| QosError::HardwareInit {
                message: format!("malformed min_cbm_bits: {e}"),
            })?;

        Ok(Capabilities {
            l3_cat: true,
            mba: info.join("MB").is_dir(),
            cache_ways,
            min_cbm_bits,
        })
    }

    fn apply(&mut self, pools: &TierPools) -> QosResult<()> {
        let caps = self.capabilities()?;
        let masks = derive_way_masks(caps.cache_ways, caps.min_cbm_bits, &self.way_shares)?;
        for tier in Tier::ALL {
            self.write_group(tier, masks.mask(tier), pools)?;
        }
        tracing::debug!(
            "applied tier way masks: production={:#x} preproduction={:#x} besteffort={:#x}",
            masks.production,
            masks.preproduction,
            masks.besteffort
        );
        Ok(())
    }

    fn finalize(&mut self) -> QosResult<()> {
        if !self.initialized {
            return Ok(());
        }
        for tier in Tier::ALL {
            let dir = self.group_dir(tier);
            if let Err(e) = std::fs::remove_dir(&dir) {
                // Group removal returns the tasks/cores to the default group.
                tracing::debug!(group = %dir.display(), error = %e, "group removal skipped");
            }
        }
        self.initialized = false;
        Ok(())
    }
}

/// Recording allocator for tests.
///
/// Captures every applied pool set and can inject apply failures.
#[derive(Debug, Clone)]
pub struct MockAllocator {
    caps: Capabilities,
    applied: Arc<Mutex<Vec<TierPools>>>,
    fail_apply: Arc<AtomicBool>,
    fail_init: Arc<AtomicBool>,
    initialized: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
}

impl Default for MockAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAllocator {
    /// Mock with full CAT+MBA capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            l3_cat: true,
            mba: true,
            cache_ways: 12,
            min_cbm_bits: 1,
        })
    }

    /// Mock reporting the given capabilities.
    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            applied: Arc::new(Mutex::new(Vec::new())),
            fail_apply: Arc::new(AtomicBool::new(false)),
            fail_init: Arc::new(AtomicBool::new(false)),
            initialized: Arc::new(AtomicBool::new(false)),
            finalized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// All pool sets applied so far, in order.
    pub fn applications(&self) -> Vec<TierPools> {
        self.applied.lock().clone()
    }

    /// Number of successful applications.
    pub fn apply_count(&self) -> usize {
        self.applied.lock().len()
    }

    /// Make subsequent `apply` calls fail (or succeed again).
    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::Release);
    }

    /// Make `init` fail.
    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::Release);
    }

    /// Whether `init` has run.
    pub fn was_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether `finalize` has run.
    pub fn was_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

impl CacheAllocator for MockAllocator {
    fn init(&mut self) -> QosResult<()> {
        if self.fail_init.load(Ordering::Acquire) {
            return Err(QosError::HardwareInit {
                message: "injected init failure".to_string(),
            });
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn capabilities(&self) -> QosResult<Capabilities> {
        Ok(self.caps)
    }

    fn apply(&mut self, pools: &TierPools) -> QosResult<()> {
        if self.fail_apply.load(Ordering::Acquire) {
            return Err(QosError::apply("injected apply failure"));
        }
        self.applied.lock().push(pools.clone());
        Ok(())
    }

    fn finalize(&mut self) -> QosResult<()> {
        self.finalized.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_contiguous_and_disjoint() {
        let masks = derive_way_masks(12, 1, &WayShares::default()).unwrap();
        assert_eq!(masks.production, 0xfc0);
        assert_eq!(masks.preproduction, 0x038);
        assert_eq!(masks.besteffort, 0x007);
        assert_eq!(masks.production & masks.preproduction, 0);
        assert_eq!(masks.preproduction & masks.besteffort, 0);
    }

    #[test]
    fn parse_domains_multi_socket() {
        let schemata = "L3:0=fff;1=fff\nMB:0=100;1=100";
        assert_eq!(
            ResctrlAllocator::parse_domains(schemata, "L3"),
            vec![0, 1]
        );
        assert_eq!(ResctrlAllocator::parse_domains(schemata, "MB"), vec![0, 1]);
        assert!(ResctrlAllocator::parse_domains(schemata, "L2").is_empty());
    }
}
