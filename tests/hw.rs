//! Hardware allocator and capability gate tests.
//!
//! The resctrl tests run against a temp-dir replica of the resctrl
//! filesystem layout; no hardware access is involved.

mod common;

use cacheqos::core::config::{Config, HardwareConfig, WayShares};
use cacheqos::hw::allocator::{derive_way_masks, CacheAllocator, MockAllocator, ResctrlAllocator};
use cacheqos::hw::caps::{check_capabilities, Capabilities};
use cacheqos::tiers::Tier;
use common::pools;
use std::fs;
use std::path::Path;

// ============================================================================
// Way mask derivation
// ============================================================================

#[test]
fn default_shares_partition_twelve_ways() {
    let masks = derive_way_masks(12, 1, &WayShares::default()).unwrap();

    // 50/30/20 over 12 ways: 6 + 3 + 3, top-down, contiguous.
    assert_eq!(masks.production, 0xfc0);
    assert_eq!(masks.preproduction, 0x038);
    assert_eq!(masks.besteffort, 0x007);
}

#[test]
fn masks_never_overlap() {
    for ways in [4u32, 8, 11, 16, 20] {
        let masks = derive_way_masks(ways, 1, &WayShares::default()).unwrap();
        assert_eq!(masks.production & masks.preproduction, 0, "{ways} ways");
        assert_eq!(masks.production & masks.besteffort, 0, "{ways} ways");
        assert_eq!(masks.preproduction & masks.besteffort, 0, "{ways} ways");
    }
}

#[test]
fn every_tier_gets_min_cbm_bits() {
    let masks = derive_way_masks(8, 2, &WayShares::default()).unwrap();
    for tier in Tier::ALL {
        assert!(
            masks.mask(tier).count_ones() >= 2,
            "{tier} mask too narrow: {:#x}",
            masks.mask(tier)
        );
    }
}

#[test]
fn too_few_ways_is_a_capability_error() {
    // Three tiers at two ways each cannot fit into four ways.
    let err = derive_way_masks(4, 2, &WayShares::default()).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

// ============================================================================
// Capability gate
// ============================================================================

#[test]
fn gate_rejects_hosts_without_cat() {
    let err = check_capabilities(&Capabilities::none(), false).unwrap_err();
    assert!(err.to_string().contains("cat"), "got: {err}");
}

#[test]
fn gate_requires_mba_only_when_configured() {
    let caps = Capabilities {
        l3_cat: true,
        mba: false,
        cache_ways: 12,
        min_cbm_bits: 1,
    };
    assert!(check_capabilities(&caps, false).is_ok());
    assert!(check_capabilities(&caps, true).is_err());
}

// ============================================================================
// Mock allocator
// ============================================================================

#[test]
fn mock_records_applications_in_order() {
    let mut mock = MockAllocator::new();
    mock.apply(&pools(&[0], &[], &[])).unwrap();
    mock.apply(&pools(&[0, 1], &[2], &[3])).unwrap();

    let applied = mock.applications();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1].besteffort.cores.len(), 1);
}

#[test]
fn mock_injected_failure_records_nothing() {
    let mut mock = MockAllocator::new();
    mock.set_fail_apply(true);
    assert!(mock.apply(&pools(&[0], &[], &[])).is_err());
    assert_eq!(mock.apply_count(), 0);
}

// ============================================================================
// Resctrl allocator (temp-dir filesystem replica)
// ============================================================================

fn fake_resctrl(root: &Path, cbm_mask: &str, with_mb: bool) {
    fs::create_dir_all(root.join("info/L3")).unwrap();
    fs::write(root.join("info/L3/cbm_mask"), format!("{cbm_mask}\n")).unwrap();
    fs::write(root.join("info/L3/min_cbm_bits"), "1\n").unwrap();

    let mut schemata = "L3:0=fff;1=fff\n".to_string();
    if with_mb {
        fs::create_dir_all(root.join("info/MB")).unwrap();
        schemata.push_str("MB:0=100;1=100\n");
    }
    fs::write(root.join("schemata"), schemata).unwrap();
}

fn hardware_config(root: &Path, mba_enabled: bool) -> HardwareConfig {
    let mut hardware = Config::default().hardware;
    hardware.resctrl_root = root.to_string_lossy().into_owned();
    hardware.mba_enabled = mba_enabled;
    hardware
}

#[test]
fn resctrl_init_fails_when_not_mounted() {
    let dir = tempfile::tempdir().unwrap();
    let mut allocator = ResctrlAllocator::new(&hardware_config(dir.path(), false));

    let err = allocator.init().unwrap_err();
    assert!(err.to_string().contains("not mounted"), "got: {err}");
}

#[test]
fn resctrl_detects_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    fake_resctrl(dir.path(), "fff", true);
    let mut allocator = ResctrlAllocator::new(&hardware_config(dir.path(), false));
    allocator.init().unwrap();

    let caps = allocator.capabilities().unwrap();
    assert!(caps.l3_cat);
    assert!(caps.mba);
    assert_eq!(caps.cache_ways, 12);
    assert_eq!(caps.min_cbm_bits, 1);
}

#[test]
fn resctrl_reports_no_capabilities_without_l3_info() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("schemata"), "L3:0=fff\n").unwrap();
    let allocator = ResctrlAllocator::new(&hardware_config(dir.path(), false));

    let caps = allocator.capabilities().unwrap();
    assert!(!caps.l3_cat);
}

#[test]
fn resctrl_apply_writes_group_schemata_and_cores() {
    let dir = tempfile::tempdir().unwrap();
    fake_resctrl(dir.path(), "fff", false);
    let mut allocator = ResctrlAllocator::new(&hardware_config(dir.path(), false));
    allocator.init().unwrap();

    allocator.apply(&pools(&[0, 1], &[2], &[3])).unwrap();

    let schemata =
        fs::read_to_string(dir.path().join("cacheqos_production/schemata")).unwrap();
    assert_eq!(schemata, "L3:0=fc0;1=fc0\n");

    let cores = fs::read_to_string(dir.path().join("cacheqos_production/cpus_list")).unwrap();
    assert_eq!(cores, "0,1");

    let be = fs::read_to_string(dir.path().join("cacheqos_besteffort/schemata")).unwrap();
    assert_eq!(be, "L3:0=7;1=7\n");
}

#[test]
fn resctrl_apply_includes_mb_line_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    fake_resctrl(dir.path(), "fff", true);
    let mut allocator = ResctrlAllocator::new(&hardware_config(dir.path(), true));
    allocator.init().unwrap();

    allocator.apply(&pools(&[0], &[], &[])).unwrap();

    let schemata =
        fs::read_to_string(dir.path().join("cacheqos_preproduction/schemata")).unwrap();
    assert!(schemata.contains("MB:0=60;1=60"), "got: {schemata}");
}

#[test]
fn resctrl_finalize_is_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    fake_resctrl(dir.path(), "fff", false);
    let mut allocator = ResctrlAllocator::new(&hardware_config(dir.path(), false));
    allocator.init().unwrap();
    allocator.apply(&pools(&[0], &[], &[])).unwrap();

    // Group removal is rmdir on the kernel fs; in this replica the dirs
    // hold regular files, so removal is skipped without error.
    allocator.finalize().unwrap();

    // Finalize before init is also a no-op.
    let mut untouched = ResctrlAllocator::new(&hardware_config(dir.path(), false));
    untouched.finalize().unwrap();
}
