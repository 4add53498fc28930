//! HTTP route handlers for the guard.

use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod health;
mod token;

pub use token::client_identifier;

/// Path of the guarded token endpoint
pub const TOKEN_PATH: &str = "/connect/token";

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Guarded credential exchange
        .route(TOKEN_PATH, post(token::token))

        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}
