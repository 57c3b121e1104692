//! cacheqos - last-level cache and memory bandwidth partitioning daemon.
//!
//! cacheqos partitions a CPU's shared last-level cache (Intel CAT) and,
//! optionally, memory bandwidth (MBA) among three workload tiers:
//! Production, Pre-Production, and Best-Effort. Operators declare which
//! cores and processes belong to which tier over an HTTP control surface;
//! the daemon continuously reconciles that desired state against the live
//! hardware configuration through the Linux resctrl filesystem.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Control Surface (HTTP)                   │
//! │         /pools  /caps  /stats  /health  (axum)           │
//! └──────────────────────────────────────────────────────────┘
//!                            │ writes
//! ┌──────────────────────────────────────────────────────────┐
//! │              Desired-State Store (ConfigStore)            │
//! │         tier pools + monotonic change marker              │
//! └──────────────────────────────────────────────────────────┘
//!                            │ observes
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Reconcile Loop                         │
//! │    poll marker → re-derive → apply → sleep (1s)           │
//! └──────────────────────────────────────────────────────────┘
//!                            │ programs
//! ┌──────────────────────────────────────────────────────────┐
//! │              Cache Allocator (resctrl)                    │
//! │      per-tier groups: way masks, MB throttle, cpus        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and the desired-state store
//! - [`core::error`] - Error taxonomy and exit codes
//! - [`core::runtime`] - Lifecycle orchestration
//! - [`tiers`] - Tier classification and validation primitives
//! - [`hw::caps`] - Capability detection and the startup gate
//! - [`hw::allocator`] - resctrl allocator behind the `CacheAllocator` trait
//! - [`reconcile`] - The poll-detect-reapply loop
//! - [`rest`] - Control-surface HTTP server
//! - [`ops::stats`] - Shared statistics
//!
//! # Key Invariants
//!
//! - A core or PID belongs to at most one tier at any observation instant.
//! - The control surface never starts if the capability gate fails.
//! - The first hardware application is unconditional and startup-fatal on
//!   failure; later failures keep the last applied configuration.
//! - The change marker only advances; the loop coalesces multiple updates
//!   into one application of the latest pool set.

// Core infrastructure
pub mod core;

// Tier classification
pub mod tiers;

// Hardware integration
pub mod hw;

// Reconciliation loop
pub mod reconcile;

// Control surface
pub mod rest;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use hw::{allocator, caps};
pub use ops::stats;
