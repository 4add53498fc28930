//! Common error types for Portcullis components.

use thiserror::Error;

/// Common errors across Portcullis components
#[derive(Debug, Error)]
pub enum PortcullisError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure ledger could not be read or written
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Upstream grant pipeline unreachable or broken
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl PortcullisError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::LedgerUnavailable(_) => 503,
            Self::Upstream(_) => 502,
        }
    }
}
