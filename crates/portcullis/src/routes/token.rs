//! Guarded OAuth2 token endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use portcullis_common::PortcullisError;
use serde_json::json;
use std::net::SocketAddr;

use crate::guard::LoginAttempt;
use crate::state::AppState;

/// Resolve the caller identifier: first entry of the trusted header when
/// configured and present, otherwise the TCP peer address.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: SocketAddr,
    trusted_header: Option<&HeaderName>,
) -> String {
    trusted_header
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}

/// Run a token request through the challenge guard
pub async fn token(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identifier = client_identifier(&headers, peer, state.client_ip_header.as_ref());

    let attempt = LoginAttempt {
        identifier,
        headers,
        body,
    };

    match state.decider.handle(attempt).await {
        Ok(decision) => decision.response,
        Err(e) => {
            let err = PortcullisError::from(e);
            tracing::error!(error = %err, "Token endpoint unreachable");

            let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                Json(json!({
                    "error": "temporarily_unavailable",
                    "error_description": "token service unreachable",
                })),
            )
                .into_response()
        }
    }
}
