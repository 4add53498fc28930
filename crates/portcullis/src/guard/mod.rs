//! Challenge orchestration.
//!
//! [`ChallengeDecider`] runs one decision cycle per login attempt. It owns no
//! per-identifier state of its own; the failure ledger does.

mod decider;

pub use decider::{ChallengeDecider, Decision, LoginAttempt};

use serde::Deserialize;
use std::collections::HashSet;

/// What to assume when the failure ledger cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerUnavailablePolicy {
    /// Treat the caller as over the threshold (always challenge)
    #[default]
    FailClosed,
    /// Treat the caller as having no failures
    FailOpen,
}

/// Immutable guard settings, built once at startup
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Verifier credential
    pub secret_key: String,

    /// Failures tolerated before a challenge is owed (`count >= threshold`)
    pub failure_threshold: u32,

    /// Grant types the guard applies to; others bypass it
    pub protected_grant_types: HashSet<String>,

    pub ledger_unavailable_policy: LedgerUnavailablePolicy,
}

impl GuardConfig {
    /// Whether a request carrying these `grant_type` values must pass the
    /// threshold check. A request naming no grant type, or naming any
    /// protected one among several, is guarded.
    pub fn protects(&self, grant_types: &[String]) -> bool {
        grant_types.is_empty()
            || grant_types
                .iter()
                .any(|g| self.protected_grant_types.contains(g))
    }
}
