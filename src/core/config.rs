//! Configuration parsing, validation, and the desired-state store.
//!
//! cacheqos configuration is loaded once at startup from a TOML file with
//! CLI overrides. The validated tier pools seed the [`ConfigStore`], which
//! the control surface mutates and the reconcile loop observes through a
//! monotonic change marker.

use crate::core::error::QosResult;
use crate::tiers::{host_core_count, Pool, Tier, TierPools};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default configuration file path.
pub const CONFIG_FILENAME: &str = "cacheqos.toml";

/// Top-level cacheqos configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Desired tier membership.
    #[serde(default)]
    pub pools: TierPools,

    /// Control-surface listener configuration.
    #[serde(default)]
    pub control: ControlConfig,

    /// Hardware allocation configuration.
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Control-surface listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Listen address.
    #[serde(default = "default_control_address")]
    pub address: String,

    /// Listen port.
    #[serde(default = "default_control_port")]
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_control_address(),
            port: default_control_port(),
        }
    }
}

/// Hardware allocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Root of the resctrl filesystem.
    #[serde(default = "default_resctrl_root")]
    pub resctrl_root: String,

    /// Enable memory-bandwidth (MBA) control in addition to cache allocation.
    #[serde(default)]
    pub mba_enabled: bool,

    /// Share of cache ways granted to each tier, in percent.
    #[serde(default)]
    pub way_shares: WayShares,

    /// Memory-bandwidth throttle per tier, in percent, when MBA is enabled.
    #[serde(default)]
    pub mba_shares: MbaShares,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            resctrl_root: default_resctrl_root(),
            mba_enabled: false,
            way_shares: WayShares::default(),
            mba_shares: MbaShares::default(),
        }
    }
}

/// Per-tier cache-way shares in percent. Must sum to at most 100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WayShares {
    #[serde(default = "default_production_ways")]
    pub production: u8,

    #[serde(default = "default_preproduction_ways")]
    pub preproduction: u8,

    #[serde(default = "default_besteffort_ways")]
    pub besteffort: u8,
}

impl Default for WayShares {
    fn default() -> Self {
        Self {
            production: default_production_ways(),
            preproduction: default_preproduction_ways(),
            besteffort: default_besteffort_ways(),
        }
    }
}

impl WayShares {
    /// Share for a tier.
    pub fn share(&self, tier: Tier) -> u8 {
        match tier {
            Tier::Production => self.production,
            Tier::PreProduction => self.preproduction,
            Tier::BestEffort => self.besteffort,
        }
    }
}

/// Per-tier memory-bandwidth throttle in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MbaShares {
    #[serde(default = "default_production_mba")]
    pub production: u8,

    #[serde(default = "default_preproduction_mba")]
    pub preproduction: u8,

    #[serde(default = "default_besteffort_mba")]
    pub besteffort: u8,
}

impl Default for MbaShares {
    fn default() -> Self {
        Self {
            production: default_production_mba(),
            preproduction: default_preproduction_mba(),
            besteffort: default_besteffort_mba(),
        }
    }
}

impl MbaShares {
    /// Throttle for a tier.
    pub fn share(&self, tier: Tier) -> u8 {
        match tier {
            Tier::Production => self.production,
            Tier::PreProduction => self.preproduction,
            Tier::BestEffort => self.besteffort,
        }
    }
}

// Default value functions

fn default_control_address() -> String {
    "0.0.0.0".to_string()
}

fn default_control_port() -> u16 {
    5000
}

fn default_resctrl_root() -> String {
    "/sys/fs/resctrl".to_string()
}

fn default_production_ways() -> u8 {
    50
}

fn default_preproduction_ways() -> u8 {
    30
}

fn default_besteffort_ways() -> u8 {
    20
}

fn default_production_mba() -> u8 {
    100
}

fn default_preproduction_mba() -> u8 {
    60
}

fn default_besteffort_mba() -> u8 {
    30
}

impl Config {
    /// Load configuration from a TOML file and validate it against this host.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate(host_core_count())?;
        Ok(config)
    }

    /// Load configuration from a TOML string and validate it against this host.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate(host_core_count())?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref address) = overrides.address {
            self.control.address = address.clone();
        }
        if let Some(port) = overrides.port {
            self.control.port = port;
        }
    }

    /// Validate configuration consistency for a host with `core_count`
    /// logical cores.
    pub fn validate(&self, core_count: usize) -> Result<()> {
        self.pools
            .validate(core_count)
            .map_err(|e| anyhow::anyhow!(e))?;
        self.validate_shares()?;
        Ok(())
    }

    fn validate_shares(&self) -> Result<()> {
        let shares = &self.hardware.way_shares;
        for tier in Tier::ALL {
            if shares.share(tier) == 0 {
                anyhow::bail!("hardware.way_shares.{} must be > 0", tier);
            }
        }
        let total =
            shares.production as u32 + shares.preproduction as u32 + shares.besteffort as u32;
        if total > 100 {
            anyhow::bail!("hardware.way_shares must sum to at most 100, got {total}");
        }

        if self.hardware.mba_enabled {
            for tier in Tier::ALL {
                let throttle = self.hardware.mba_shares.share(tier);
                if throttle == 0 || throttle > 100 {
                    anyhow::bail!(
                        "hardware.mba_shares.{} must be in 1..=100, got {}",
                        tier,
                        throttle
                    );
                }
            }
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override control-surface listen address.
    pub address: Option<String>,
    /// Override control-surface listen port.
    pub port: Option<u16>,
}

/// Desired-state store shared between the control surface and the loop.
///
/// The store owns the tier pools; the reconcile loop only ever reads them.
/// Every mutation advances the generation, an opaque monotonic change
/// marker the loop compares against its last observation. Writes are
/// atomic with respect to reads: a reader never observes a partially
/// updated pool set.
pub struct ConfigStore {
    pools: RwLock<TierPools>,
    generation: AtomicU64,
}

impl ConfigStore {
    /// Create a store seeded with the given pools.
    pub fn new(pools: TierPools) -> Self {
        Self {
            pools: RwLock::new(pools),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot the current pool set.
    pub fn pools(&self) -> TierPools {
        self.pools.read().clone()
    }

    /// Snapshot a single tier's pool.
    pub fn pool(&self, tier: Tier) -> Pool {
        self.pools.read().pool(tier).clone()
    }

    /// Replace a single tier's pool, advancing the change marker.
    ///
    /// The candidate pool set is validated for cross-tier disjointness
    /// before it is committed; a rejected write leaves both the pools and
    /// the marker untouched.
    pub fn set_pool(&self, tier: Tier, pool: Pool) -> QosResult<()> {
        let mut guard = self.pools.write();
        let mut candidate = guard.clone();
        *candidate.pool_mut(tier) = pool;
        candidate.validate_disjoint()?;
        *guard = candidate;
        drop(guard);
        self.bump();
        Ok(())
    }

    /// Replace the entire pool set, advancing the change marker.
    pub fn replace(&self, pools: TierPools) -> QosResult<()> {
        pools.validate_disjoint()?;
        *self.pools.write() = pools;
        self.bump();
        Ok(())
    }

    /// Current change marker. Advances on every committed mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }
}
