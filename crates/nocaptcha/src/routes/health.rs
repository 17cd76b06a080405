//! Health check endpoints.

use axum::{Json, extract::State};
use serde::Serialize;

use nocaptcha_common::MetricsSnapshot;

use crate::challenge::RelyingParty;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    pending_sessions: usize,
}

/// Readiness check. All state is in-process, so a running server is ready.
pub async fn ready_check<R: RelyingParty>(
    State(state): State<AppState<R>>,
) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        pending_sessions: state.challenges.sessions().len().await,
    })
}

#[derive(Serialize)]
pub struct MetricsResponse {
    uptime_secs: u64,
    #[serde(flatten)]
    snapshot: MetricsSnapshot,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics<R: RelyingParty>(
    State(state): State<AppState<R>>,
) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_secs: state.uptime_secs(),
        snapshot: state.challenges.metrics().await,
    })
}
