//! Hardware integration: capability detection and the cache allocator.

pub mod allocator;
pub mod caps;
