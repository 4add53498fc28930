//! Configuration management for the guard.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::guard::{GuardConfig, LedgerUnavailablePolicy};
use portcullis_common::constants::{
    DEFAULT_CHALLENGE_URL, DEFAULT_FAILURE_THRESHOLD, DEFAULT_LISTEN_ADDR,
    DEFAULT_PROTECTED_GRANT_TYPE, DEFAULT_REDIS_URL, DEFAULT_UPSTREAM_TIMEOUT_SECS,
    DEFAULT_VERIFIER_TIMEOUT_MS,
};

/// Values given on the command line take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub listen_addr: Option<String>,
    pub redis_url: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Header carrying the client address when running behind a proxy
    /// (e.g. `X-Forwarded-For`). Unset: use the TCP peer address.
    #[serde(default)]
    pub client_ip_header: Option<String>,

    /// Request timeout for the whole guarded exchange, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Challenge trigger configuration
    #[serde(default)]
    pub guard: GuardSection,

    /// Verification service configuration
    #[serde(default)]
    pub recaptcha: RecaptchaConfig,

    /// Failure ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Wrapped token endpoint
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardSection {
    /// Failures tolerated before a challenge is owed
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Grant types the guard applies to
    #[serde(default = "default_protected_grant_types")]
    pub protected_grant_types: Vec<String>,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            protected_grant_types: default_protected_grant_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecaptchaConfig {
    /// Verifier credential
    #[serde(default)]
    pub secret_key: String,

    /// Verifier endpoint
    #[serde(default = "default_verification_uri")]
    pub verification_uri: String,

    /// Path advertised in `WWW-Authenticate`
    #[serde(default = "default_challenge_url")]
    pub challenge_url: String,

    /// Verifier call timeout in milliseconds (elapsed = verifier unavailable)
    #[serde(default = "default_verifier_timeout")]
    pub timeout_ms: u64,
}

impl Default for RecaptchaConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            verification_uri: default_verification_uri(),
            challenge_url: default_challenge_url(),
            timeout_ms: default_verifier_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Memory,
    Redis,
}

/// Pre-loaded failure count for one identifier
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFailure {
    pub identifier: String,
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,

    /// Redis connection URL (redis backend only)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Failure records expire after this many seconds (unset = never)
    #[serde(default)]
    pub failure_ttl_secs: Option<u64>,

    /// Behaviour when the ledger cannot be read
    #[serde(default)]
    pub unavailable_policy: LedgerUnavailablePolicy,

    /// Failure counts applied at startup
    #[serde(default)]
    pub seed_failures: Vec<SeedFailure>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            redis_url: default_redis_url(),
            failure_ttl_secs: None,
            unavailable_policy: LedgerUnavailablePolicy::default(),
            seed_failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Token endpoint receiving forwarded requests
    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_failure_threshold() -> u32 { DEFAULT_FAILURE_THRESHOLD }
fn default_protected_grant_types() -> Vec<String> { vec![DEFAULT_PROTECTED_GRANT_TYPE.to_string()] }
fn default_verification_uri() -> String { "https://www.google.com/recaptcha/api/siteverify".to_string() }
fn default_challenge_url() -> String { DEFAULT_CHALLENGE_URL.to_string() }
fn default_verifier_timeout() -> u64 { DEFAULT_VERIFIER_TIMEOUT_MS }
fn default_token_url() -> String { "http://127.0.0.1:5000/connect/token".to_string() }
fn default_upstream_timeout() -> u64 { DEFAULT_UPSTREAM_TIMEOUT_SECS }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .add_source(config::Environment::with_prefix("PORTCULLIS").separator("__"))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = overrides.listen_addr {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = overrides.redis_url {
            config.ledger.redis_url = redis_url.clone();
            config.ledger.backend = LedgerBackend::Redis;
        }

        config.validate()?;

        Ok(config)
    }

    /// Reject settings the guard cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.guard.failure_threshold == 0 {
            bail!("guard.failure_threshold must be at least 1");
        }
        if !self.guard.protected_grant_types.is_empty() && self.recaptcha.secret_key.is_empty() {
            bail!("recaptcha.secret_key is required when any grant type is protected");
        }
        if self.recaptcha.timeout_ms == 0 {
            bail!("recaptcha.timeout_ms must be positive");
        }
        Ok(())
    }

    /// Freeze the decision-relevant settings
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            secret_key: self.recaptcha.secret_key.clone(),
            failure_threshold: self.guard.failure_threshold,
            protected_grant_types: self
                .guard
                .protected_grant_types
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
            ledger_unavailable_policy: self.ledger.unavailable_policy,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            client_ip_header: None,
            request_timeout_secs: default_request_timeout(),
            guard: GuardSection::default(),
            recaptcha: RecaptchaConfig::default(),
            ledger: LedgerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}
