//! Failure ledger: consecutive login failures per caller identifier.
//!
//! The ledger is the only shared mutable state of the guard. Backends must
//! make increment-or-create and reset atomic per identifier; no
//! cross-identifier locking is needed.

mod memory;
mod redis;

pub use self::memory::{MemoryLedger, sweep_worker};
pub use self::redis::RedisLedger;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by ledger backends
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("corrupt record for {identifier}: {reason}")]
    Corrupt { identifier: String, reason: String },
}

impl From<LedgerError> for portcullis_common::PortcullisError {
    fn from(err: LedgerError) -> Self {
        Self::LedgerUnavailable(err.to_string())
    }
}

/// Keyed failure counter
#[async_trait]
pub trait FailureLedger: Send + Sync {
    /// Increment the identifier's count (creating the record if absent).
    /// Returns the count after the increment.
    async fn record_failure(&self, identifier: &str) -> Result<u32, LedgerError>;

    /// Reset the identifier's count to zero. Idempotent.
    async fn record_success(&self, identifier: &str) -> Result<(), LedgerError>;

    /// Current count; 0 for unknown identifiers
    async fn failure_count(&self, identifier: &str) -> Result<u32, LedgerError>;

    /// Overwrite the identifier's count (operator pre-loading, tests)
    async fn seed(&self, identifier: &str, count: u32) -> Result<(), LedgerError>;

    /// Backend health check
    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}
