//! Control-surface HTTP server.
//!
//! Operators declare tier membership through this API; the daemon itself
//! never calls it. Writes validate at the edge (core range, cross-tier
//! disjointness) and commit atomically to the desired-state store, which
//! advances the change marker the reconcile loop polls.
//!
//! Endpoints:
//! - `GET /health` — liveness.
//! - `GET /caps` — host partitioning capabilities.
//! - `GET /pools` / `GET /pools/{tier}` — desired state.
//! - `PUT /pools/{tier}` — replace one tier's pool.
//! - `GET /stats` — reconcile statistics.

use crate::core::config::ConfigStore;
use crate::core::error::{QosError, QosResult};
use crate::hw::caps::Capabilities;
use crate::ops::stats::StatsStore;
use crate::tiers::{is_core_valid, Pool, Tier, TierPools};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub stats: Arc<StatsStore>,
    pub caps: Capabilities,
    pub core_count: usize,
}

/// JSON error body for rejected requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Liveness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

fn reject(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Build the control-surface router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/caps", get(get_caps))
        .route("/pools", get(get_pools))
        .route("/pools/{tier}", get(get_pool).put(put_pool))
        .route("/stats", get(get_stats))
        .with_state(state)
}

async fn get_health() -> Json<HealthStatus> {
    Json(HealthStatus {
        healthy: true,
        message: "OK".to_string(),
    })
}

async fn get_caps(State(state): State<AppState>) -> Json<Capabilities> {
    Json(state.caps)
}

async fn get_pools(State(state): State<AppState>) -> Json<TierPools> {
    Json(state.store.pools())
}

async fn get_pool(State(state): State<AppState>, Path(tier): Path<String>) -> Response {
    match tier.parse::<Tier>() {
        Ok(tier) => Json(state.store.pool(tier)).into_response(),
        Err(e) => reject(StatusCode::NOT_FOUND, e.to_string()),
    }
}

async fn put_pool(
    State(state): State<AppState>,
    Path(tier): Path<String>,
    Json(pool): Json<Pool>,
) -> Response {
    let tier = match tier.parse::<Tier>() {
        Ok(tier) => tier,
        Err(e) => return reject(StatusCode::NOT_FOUND, e.to_string()),
    };

    // Core range is checked at the edge; a bad core never reaches hardware.
    for &core in &pool.cores {
        if !is_core_valid(core, state.core_count) {
            return reject(
                StatusCode::BAD_REQUEST,
                QosError::InvalidCore {
                    core,
                    core_count: state.core_count,
                }
                .to_string(),
            );
        }
    }

    match state.store.set_pool(tier, pool) {
        Ok(()) => {
            tracing::info!(%tier, generation = state.store.generation(), "pool updated");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => reject(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn get_stats(State(state): State<AppState>) -> Response {
    Json(state.stats.general_stats()).into_response()
}

/// Bind the control-surface listener.
///
/// Kept separate from [`serve`] so the orchestrator can treat a bind
/// failure as startup-fatal before the reconcile loop starts.
pub async fn bind(addr: SocketAddr) -> QosResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| QosError::ControlSurface {
            message: format!("failed to bind {addr}: {e}"),
        })
}

/// Serve the control surface until the shutdown channel flips.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> QosResult<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| QosError::ControlSurface {
            message: format!("server error: {e}"),
        })
}
