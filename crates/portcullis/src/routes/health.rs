//! Health check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use portcullis_common::{ChallengeStats, PortcullisError};
use serde::Serialize;

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
    ledger: bool,
}

/// Readiness check (is the failure ledger reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    match state.ledger.ping().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            ledger: true,
        })),
        Err(e) => {
            let err = PortcullisError::from(e);
            tracing::warn!(error = %err, "Ledger not ready");
            Err(StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE))
        }
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    failure_threshold: u32,
    #[serde(flatten)]
    challenges: ChallengeStats,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(
    State(state): State<AppState>,
) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        failure_threshold: state.decider.config().failure_threshold,
        challenges: state.metrics.snapshot(),
    })
}
