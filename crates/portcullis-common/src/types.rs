//! Core types shared across Portcullis components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of asking the verification service about a caller-supplied token.
///
/// `ServiceUnavailable` covers network errors, timeouts and non-2xx answers.
/// It is NOT a negative verdict: the guard lets such attempts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationVerdict {
    /// Verifier reachable, token accepted
    Succeeded,
    /// Verifier reachable, token rejected
    Failed,
    /// Verifier unreachable or erroring
    ServiceUnavailable,
}

impl VerificationVerdict {
    /// Returns true if the attempt may proceed to the grant pipeline (fail-open)
    pub fn passes(&self) -> bool {
        matches!(self, Self::Succeeded | Self::ServiceUnavailable)
    }
}

/// Terminal outcome of one decision cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeOutcome {
    /// Below threshold (or unprotected grant type), no challenge involved
    NotRequired,
    /// Challenge owed, token verified (or verifier down), request forwarded
    ChallengeSucceeded,
    /// Challenge owed, verifier rejected the token
    ChallengeFailed,
    /// Challenge owed, no token supplied
    ChallengeIssued,
}

impl ChallengeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::ChallengeSucceeded => "challenge_succeeded",
            Self::ChallengeFailed => "challenge_failed",
            Self::ChallengeIssued => "challenge_issued",
        }
    }
}

impl std::fmt::Display for ChallengeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the grant pipeline answered a forwarded credential exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantOutcome {
    /// Credentials accepted, tokens issued
    Granted,
    /// Credentials rejected (counts as a login failure)
    Rejected,
    /// Anything else (malformed request, upstream error); the ledger is not touched
    Other,
}

/// Consecutive authentication failures for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Caller identifier (typically the client IP address)
    pub identifier: String,

    /// Number of failures since the last reset
    pub count: u32,

    /// Time of the most recent failure
    pub last_failure: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(identifier: String) -> Self {
        Self {
            identifier,
            count: 0,
            last_failure: Utc::now(),
        }
    }

    /// Register one more failure
    pub fn bump(&mut self) {
        self.count = self.count.saturating_add(1);
        self.last_failure = Utc::now();
    }

    /// Check whether the record has outlived the given TTL
    pub fn is_expired(&self, ttl_secs: Option<u64>) -> bool {
        match ttl_secs {
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(self.last_failure);
                age.num_seconds() >= ttl as i64
            }
            None => false,
        }
    }
}

/// Challenge counters snapshot for monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeStats {
    /// Attempts that never needed a challenge
    pub not_required: u64,

    /// Challenge demands issued because no token was supplied
    pub challenges_issued: u64,

    /// Challenges passed (including verifier outages)
    pub challenges_succeeded: u64,

    /// Challenges failed by the verifier
    pub challenges_failed: u64,

    /// Most recent terminal outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<ChallengeOutcome>,
}
