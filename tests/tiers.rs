//! Tier classification and validation primitive tests.

mod common;

use cacheqos::tiers::{
    is_core_valid, is_signal_set, Pool, ShutdownSignal, Tier, TierPools,
};
use common::pools;

// ============================================================================
// Core validity
// ============================================================================

#[test]
fn cores_below_count_are_valid() {
    for core in 0..4 {
        assert!(is_core_valid(core, 4), "core {core} should be valid");
    }
}

#[test]
fn cores_at_or_above_count_are_invalid() {
    assert!(!is_core_valid(4, 4));
    assert!(!is_core_valid(8, 4));
    assert!(!is_core_valid(u32::MAX, 4));
}

#[test]
fn no_core_is_valid_on_zero_count() {
    assert!(!is_core_valid(0, 0));
}

// ============================================================================
// Shutdown signal
// ============================================================================

#[test]
fn signal_starts_unset() {
    let signal = ShutdownSignal::new();
    assert!(!signal.is_set());
}

#[test]
fn signal_set_is_idempotent() {
    let signal = ShutdownSignal::new();
    signal.set();
    signal.set();
    assert!(signal.is_set());
}

#[test]
fn signal_visible_across_clones() {
    let signal = ShutdownSignal::new();
    let observer = signal.clone();
    signal.set();
    assert!(observer.is_set());
}

#[test]
fn absent_signal_reads_as_unset() {
    assert!(!is_signal_set(None));

    let signal = ShutdownSignal::new();
    assert!(!is_signal_set(Some(&signal)));
    signal.set();
    assert!(is_signal_set(Some(&signal)));
}

// ============================================================================
// Tier and pool membership
// ============================================================================

#[test]
fn tier_parses_wire_names() {
    assert_eq!("production".parse::<Tier>().unwrap(), Tier::Production);
    assert_eq!(
        "preproduction".parse::<Tier>().unwrap(),
        Tier::PreProduction
    );
    assert_eq!("besteffort".parse::<Tier>().unwrap(), Tier::BestEffort);
    assert!("premium".parse::<Tier>().is_err());
}

#[test]
fn disjoint_pools_validate() {
    let pools = pools(&[0, 1], &[2], &[3]);
    assert!(pools.validate(4).is_ok());
}

#[test]
fn overlapping_pids_rejected() {
    let pools = TierPools {
        production: Pool::new([], [100]),
        preproduction: Pool::new([], [100]),
        besteffort: Pool::default(),
    };
    let err = pools.validate_disjoint().unwrap_err();
    assert!(err.to_string().contains("pid 100"), "got: {err}");
}

#[test]
fn out_of_range_core_rejected_before_hardware() {
    let pools = pools(&[8], &[], &[]);
    let err = pools.validate(4).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn pools_iterate_in_priority_order() {
    let pools = pools(&[0], &[1], &[2]);
    let tiers: Vec<Tier> = pools.iter().map(|(tier, _)| tier).collect();
    assert_eq!(
        tiers,
        vec![Tier::Production, Tier::PreProduction, Tier::BestEffort]
    );
}
