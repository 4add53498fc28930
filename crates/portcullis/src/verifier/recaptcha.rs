//! reCAPTCHA-style verifier: `GET {uri}?secret=..&response=..` answering
//! `{"succeeded": bool}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use portcullis_common::VerificationVerdict;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::Verifier;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    /// Google's API calls this `success`
    #[serde(alias = "success")]
    succeeded: bool,

    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// HTTP client for the verification endpoint
#[derive(Debug, Clone)]
pub struct RecaptchaVerifier {
    verification_uri: Url,
    client: reqwest::Client,
}

impl RecaptchaVerifier {
    /// Build a verifier whose calls give up after `timeout`
    ///
    /// # Errors
    /// Returns an error if the URI does not parse or the HTTP client cannot be built.
    pub fn new(verification_uri: &str, timeout: Duration) -> Result<Self> {
        let verification_uri = Url::parse(verification_uri)
            .with_context(|| format!("invalid verification uri: {}", verification_uri))?;

        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build verifier http client")?;

        Ok(Self {
            verification_uri,
            client,
        })
    }
}

#[async_trait]
impl Verifier for RecaptchaVerifier {
    async fn verify(&self, secret_key: &str, token: &str) -> VerificationVerdict {
        let response = match self
            .client
            .get(self.verification_uri.clone())
            .query(&[("secret", secret_key), ("response", token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    timeout = e.is_timeout(),
                    "Verification service unreachable, failing open"
                );
                return VerificationVerdict::ServiceUnavailable;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Verification service error, failing open");
            return VerificationVerdict::ServiceUnavailable;
        }

        let body: VerificationResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable verification response, failing open");
                return VerificationVerdict::ServiceUnavailable;
            }
        };

        if body.succeeded {
            VerificationVerdict::Succeeded
        } else {
            tracing::debug!(error_codes = ?body.error_codes, "Verification token rejected");
            VerificationVerdict::Failed
        }
    }
}
