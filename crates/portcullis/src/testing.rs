//! Test doubles shared by unit tests.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use portcullis_common::{GrantOutcome, VerificationVerdict, constants::headers::X_RECAPTCHA_ANSWER};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::guard::{GuardConfig, LedgerUnavailablePolicy};
use crate::ledger::{FailureLedger, LedgerError};
use crate::pipeline::{GrantPipeline, GrantRequest, GrantResponse, PipelineError, classify};
use crate::verifier::Verifier;

pub const CORRECT_PASSWORD: &str = "Passw0rd";

pub fn guard_config(threshold: u32) -> GuardConfig {
    GuardConfig {
        secret_key: "private_key".to_string(),
        failure_threshold: threshold,
        protected_grant_types: HashSet::from(["password".to_string()]),
        ledger_unavailable_policy: LedgerUnavailablePolicy::default(),
    }
}

/// Password-grant form body for user `jeuser`
pub fn login_body(password: &str, acr_values: Option<&str>) -> String {
    let mut fields = vec![
        ("grant_type", "password"),
        ("username", "jeuser"),
        ("password", password),
        ("client_id", "native"),
    ];
    if let Some(acr) = acr_values {
        fields.push(("acr_values", acr));
    }
    serde_urlencoded::to_string(fields).unwrap()
}

pub fn answer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        X_RECAPTCHA_ANSWER,
        HeaderValue::from_str(&STANDARD.encode(token)).unwrap(),
    );
    headers
}

/// Verifier returning a fixed verdict and remembering what it was asked
pub struct StaticVerifier {
    verdict: VerificationVerdict,
    seen: Mutex<Vec<(String, String)>>,
}

impl StaticVerifier {
    pub fn new(verdict: VerificationVerdict) -> Self {
        Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn secrets(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl Verifier for StaticVerifier {
    async fn verify(&self, secret_key: &str, token: &str) -> VerificationVerdict {
        self.seen
            .lock()
            .unwrap()
            .push((secret_key.to_string(), token.to_string()));
        self.verdict
    }
}

/// Token endpoint accepting only [`CORRECT_PASSWORD`]
pub struct FakePipeline {
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakePipeline {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GrantPipeline for FakePipeline {
    async fn exchange(&self, request: GrantRequest) -> Result<GrantResponse, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(PipelineError::BadResponse("token endpoint offline".to_string()));
        }

        let fields: HashMap<String, String> = serde_urlencoded::from_bytes(&request.body).unwrap_or_default();
        let (status, body) = match fields.get("grant_type").map(String::as_str) {
            Some("client_credentials") => (StatusCode::OK, r#"{"access_token":"svc"}"#),
            Some("password") if fields.get("password").map(String::as_str) == Some(CORRECT_PASSWORD) => {
                (StatusCode::OK, r#"{"access_token":"user","token_type":"Bearer"}"#)
            }
            Some("password") => (StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#),
            _ => (StatusCode::BAD_REQUEST, r#"{"error":"unsupported_grant_type"}"#),
        };

        let outcome: GrantOutcome = classify(status, body.as_bytes());
        let response = Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        Ok(GrantResponse { outcome, response })
    }
}

/// Ledger whose backend is always down
pub struct UnavailableLedger;

fn outage(identifier: &str) -> LedgerError {
    LedgerError::Corrupt {
        identifier: identifier.to_string(),
        reason: "backend offline".to_string(),
    }
}

#[async_trait]
impl FailureLedger for UnavailableLedger {
    async fn record_failure(&self, identifier: &str) -> Result<u32, LedgerError> {
        Err(outage(identifier))
    }

    async fn record_success(&self, identifier: &str) -> Result<(), LedgerError> {
        Err(outage(identifier))
    }

    async fn failure_count(&self, identifier: &str) -> Result<u32, LedgerError> {
        Err(outage(identifier))
    }

    async fn seed(&self, identifier: &str, _count: u32) -> Result<(), LedgerError> {
        Err(outage(identifier))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Err(outage("ping"))
    }
}

#[derive(Clone)]
struct FakeVerifierState {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    calls: Arc<tokio::sync::Mutex<Vec<HashMap<String, String>>>>,
}

/// Verification service answering every GET with a canned status and body
pub struct FakeVerifierServer {
    addr: SocketAddr,
    calls: Arc<tokio::sync::Mutex<Vec<HashMap<String, String>>>>,
}

impl FakeVerifierServer {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        Self::start_delayed(status, body, Duration::ZERO).await
    }

    pub async fn start_delayed(status: StatusCode, body: &'static str, delay: Duration) -> Self {
        let calls = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let state = FakeVerifierState {
            status,
            body,
            delay,
            calls: calls.clone(),
        };

        let app = Router::new().route("/", get(answer)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, calls }
    }

    pub fn base_uri(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Query strings received so far
    pub async fn calls(&self) -> Vec<HashMap<String, String>> {
        self.calls.lock().await.clone()
    }
}

async fn answer(
    State(state): State<FakeVerifierState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.calls.lock().await.push(params);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.status, state.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TokenRequestForm;

    #[test]
    fn test_login_body_round_trips_through_form_parser() {
        let form = TokenRequestForm::parse(login_body("x", Some("recaptcha:abc")).as_bytes());
        assert_eq!(form.grant_types, vec!["password".to_string()]);
        assert_eq!(form.acr_values, vec!["recaptcha:abc".to_string()]);
    }
}
