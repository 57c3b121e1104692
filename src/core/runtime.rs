//! Lifecycle orchestration.
//!
//! The runtime sequences startup, each stage gating the next:
//! allocator init → capability gate → control surface → reconcile loop.
//! Teardown is symmetric and runs on every exit path after a successful
//! init, so no listening socket or hardware handle is leaked.

use crate::core::config::{Config, ConfigStore};
use crate::core::error::{QosError, QosResult};
use crate::hw::allocator::CacheAllocator;
use crate::hw::caps::{check_capabilities, Capabilities};
use crate::ops::stats::StatsStore;
use crate::reconcile::ReconcileLoop;
use crate::rest::{self, AppState};
use crate::tiers::{host_core_count, ShutdownSignal};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// cacheqos runtime holding all component handles.
pub struct Runtime {
    config: Config,
    store: Arc<ConfigStore>,
    stats: Arc<StatsStore>,
    shutdown: ShutdownSignal,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    server_handle: Option<JoinHandle<QosResult<()>>>,
}

impl Runtime {
    /// Create a runtime from a validated configuration.
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::new(ConfigStore::new(config.pools.clone()));
        Self {
            config,
            store,
            stats: Arc::new(StatsStore::new()),
            shutdown: ShutdownSignal::new(),
            shutdown_tx,
            shutdown_rx,
            server_handle: None,
        }
    }

    /// The desired-state store.
    pub fn store(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.store)
    }

    /// The statistics store.
    pub fn stats(&self) -> Arc<StatsStore> {
        Arc::clone(&self.stats)
    }

    /// The shutdown signal observed by the reconcile loop.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run the daemon to completion.
    ///
    /// Allocator init failure returns before any teardown is owed. After
    /// init, the control surface is stopped and the allocator finalized on
    /// every exit path, including gate and loop failures.
    pub async fn run(&mut self, allocator: &mut dyn CacheAllocator) -> QosResult<()> {
        allocator.init()?;

        let result = self.run_gated(allocator).await;

        self.stop_control_surface().await;
        if let Err(e) = allocator.finalize() {
            tracing::warn!(error = %e, "allocator finalize failed");
        }
        result
    }

    async fn run_gated(&mut self, allocator: &mut dyn CacheAllocator) -> QosResult<()> {
        let caps = allocator.capabilities()?;
        check_capabilities(&caps, self.config.hardware.mba_enabled)?;
        tracing::info!(
            cache_ways = caps.cache_ways,
            mba = caps.mba,
            "capability gate passed"
        );

        self.start_control_surface(caps).await?;

        // The interrupt path only sets the flag; the loop does the logging.
        let signal = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.set();
            }
        });

        let mut reconcile = ReconcileLoop::new(
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            self.shutdown.clone(),
        );
        reconcile.run(allocator).await
    }

    async fn start_control_surface(&mut self, caps: Capabilities) -> QosResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.control.address, self.config.control.port)
            .parse()
            .map_err(|e| QosError::ControlSurface {
                message: format!("invalid listen address: {e}"),
            })?;

        let listener = rest::bind(addr).await?;
        let local_addr = listener.local_addr().map_err(|e| QosError::ControlSurface {
            message: format!("listener address unavailable: {e}"),
        })?;
        tracing::info!(addr = %local_addr, "control surface listening");

        let state = AppState {
            store: Arc::clone(&self.store),
            stats: Arc::clone(&self.stats),
            caps,
            core_count: host_core_count(),
        };
        let shutdown_rx = self.shutdown_rx.clone();
        self.server_handle = Some(tokio::spawn(rest::serve(listener, state, shutdown_rx)));
        Ok(())
    }

    async fn stop_control_surface(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.server_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("control surface stopped"),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "control surface stopped with error");
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "control surface task panicked"),
                Err(_) => tracing::warn!("control surface stop timed out"),
            }
        }
    }
}
