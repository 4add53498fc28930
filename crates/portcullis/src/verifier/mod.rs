//! Human-verification service client.
//!
//! Only the verdict is consumed; scoring is the provider's business.

mod recaptcha;

pub use recaptcha::RecaptchaVerifier;

use async_trait::async_trait;
use portcullis_common::VerificationVerdict;

/// Trait abstraction over verification backends
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Ask the verification service whether `token` proves a human.
    ///
    /// Infallible by contract: transport and server errors are folded into
    /// [`VerificationVerdict::ServiceUnavailable`].
    async fn verify(&self, secret_key: &str, token: &str) -> VerificationVerdict;
}
