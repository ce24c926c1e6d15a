//! Loopback HTTP status endpoint.
//!
//! `GET /health` answers `ok` for liveness probes; `GET /status` reports
//! the lifecycle state, queued record count and whether a flush is in
//! flight.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::relay::dispatcher::Dispatcher;
use crate::relay::lifecycle::{Lifecycle, LifecycleState};
use crate::relay::queue::PendingQueue;
use crate::{AppError, Result};

/// Shared handles the status routes read from.
#[derive(Clone)]
pub struct StatusState {
    /// Pending records.
    pub queue: Arc<PendingQueue>,
    /// Shutdown state.
    pub lifecycle: Arc<Lifecycle>,
    /// Flush lock owner.
    pub dispatcher: Arc<Dispatcher>,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Records waiting for delivery.
    pub queued: usize,
    /// Whether a flush holds the dispatch lock.
    pub dispatching: bool,
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<StatusState>) -> Json<StatusReport> {
    Json(StatusReport {
        state: state.lifecycle.state(),
        queued: state.queue.len(),
        dispatching: state.dispatcher.is_dispatching(),
    })
}

/// Routes for the status server.
#[must_use]
pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve the status routes on `127.0.0.1:port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the listener cannot bind or the server fails.
pub async fn serve_status(state: StatusState, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind status server on {bind}: {err}")))?;
    info!(%bind, "status server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .map_err(|err| AppError::Io(format!("status server failed: {err}")))
}
