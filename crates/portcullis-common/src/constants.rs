//! Shared constants for Portcullis components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default guard HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Default number of failed logins tolerated before a challenge is owed
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default verifier call timeout (milliseconds)
pub const DEFAULT_VERIFIER_TIMEOUT_MS: u64 = 3000;

/// Default upstream token endpoint timeout (seconds)
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Path advertised in the challenge demand
pub const DEFAULT_CHALLENGE_URL: &str = "/recaptcha/platform";

/// Challenge scheme used in `WWW-Authenticate` and the acr prefix
pub const CHALLENGE_SCHEME: &str = "recaptcha";

/// Grant type protected when nothing is configured
pub const DEFAULT_PROTECTED_GRANT_TYPE: &str = "password";

/// Redis key prefixes
pub mod redis_keys {
    /// Failure record hash: failures:{identifier}
    pub const FAILURE_PREFIX: &str = "failures:";
}

/// HTTP header names
pub mod headers {
    /// Base64-encoded verification token supplied by the caller
    pub const X_RECAPTCHA_ANSWER: &str = "X-Recaptcha-Answer";
}

/// OAuth2 token request form fields
pub mod form_fields {
    pub const GRANT_TYPE: &str = "grant_type";
    pub const ACR_VALUES: &str = "acr_values";
}
