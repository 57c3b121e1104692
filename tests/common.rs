//! Shared test helpers.

use cacheqos::tiers::{Pool, TierPools};

/// Build a pool set from per-tier core lists.
#[allow(dead_code)]
pub fn pools(production: &[u32], preproduction: &[u32], besteffort: &[u32]) -> TierPools {
    TierPools {
        production: Pool::new(production.iter().copied(), []),
        preproduction: Pool::new(preproduction.iter().copied(), []),
        besteffort: Pool::new(besteffort.iter().copied(), []),
    }
}
