//! The credential-exchange pipeline the guard wraps.
//!
//! The guard treats the pipeline as a black box: it forwards the request
//! verbatim and only classifies the answer into [`GrantOutcome`] so the
//! failure ledger can be updated.

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::Response,
};
use portcullis_common::{GrantOutcome, PortcullisError};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Token request as received by the guard
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Pipeline answer: the response to relay plus its classification
#[derive(Debug)]
pub struct GrantResponse {
    pub outcome: GrantOutcome,
    pub response: Response,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream response unusable: {0}")]
    BadResponse(String),
}

impl From<PipelineError> for PortcullisError {
    fn from(err: PipelineError) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[async_trait]
pub trait GrantPipeline: Send + Sync {
    async fn exchange(&self, request: GrantRequest) -> Result<GrantResponse, PipelineError>;
}

#[derive(Deserialize)]
struct OAuthError {
    error: String,
}

/// Classify a token endpoint answer.
///
/// Only `invalid_grant` means the caller's credentials were wrong; other
/// errors (malformed request, unknown client, server trouble) are not
/// counted against the caller.
pub fn classify(status: StatusCode, body: &[u8]) -> GrantOutcome {
    if status.is_success() {
        return GrantOutcome::Granted;
    }

    if status == StatusCode::BAD_REQUEST {
        if let Ok(err) = serde_json::from_slice::<OAuthError>(body) {
            if err.error == "invalid_grant" {
                return GrantOutcome::Rejected;
            }
        }
    }

    GrantOutcome::Other
}

/// Request headers passed on to the token endpoint
const FORWARDED_REQUEST_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::AUTHORIZATION,
    header::USER_AGENT,
];

/// Response headers that describe the upstream connection, not the payload
const HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::TE,
    header::UPGRADE,
];

/// Forwards token requests to a remote OAuth2 token endpoint
#[derive(Debug, Clone)]
pub struct UpstreamPipeline {
    token_url: Url,
    client: reqwest::Client,
}

impl UpstreamPipeline {
    /// # Errors
    /// Returns an error if the URL does not parse or the client cannot be built.
    pub fn new(token_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let token_url = Url::parse(token_url)
            .with_context(|| format!("invalid upstream token url: {}", token_url))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream http client")?;

        Ok(Self { token_url, client })
    }
}

#[async_trait]
impl GrantPipeline for UpstreamPipeline {
    async fn exchange(&self, request: GrantRequest) -> Result<GrantResponse, PipelineError> {
        let mut outbound = self.client.post(self.token_url.clone());
        for name in &FORWARDED_REQUEST_HEADERS {
            if let Some(value) = request.headers.get(name) {
                outbound = outbound.header(name, value);
            }
        }

        let upstream = outbound.body(request.body).send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        for name in &HOP_BY_HOP {
            headers.remove(name);
        }
        let body = upstream.bytes().await?;

        let outcome = classify(status, &body);
        tracing::debug!(status = %status, outcome = ?outcome, "Upstream token endpoint answered");

        let mut response = Response::builder()
            .status(status)
            .body(Body::from(body))
            .map_err(|e| PipelineError::BadResponse(e.to_string()))?;
        *response.headers_mut() = headers;

        Ok(GrantResponse { outcome, response })
    }
}
