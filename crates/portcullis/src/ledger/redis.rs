//! Redis-backed ledger for deployments running several guard instances.
//!
//! Each identifier maps to a hash `failures:{identifier}` with fields
//! `count` and `last_failure` (Unix seconds).

use async_trait::async_trait;
use portcullis_common::constants::redis_keys::FAILURE_PREFIX;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{FailureLedger, LedgerError};

const COUNT_FIELD: &str = "count";
const LAST_FAILURE_FIELD: &str = "last_failure";

/// Shared failure ledger
pub struct RedisLedger {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
    /// Key expiry in seconds (None = keys never expire)
    failure_ttl: Option<u64>,
}

impl RedisLedger {
    pub fn new(redis: ConnectionManager, failure_ttl: Option<u64>) -> Self {
        Self { redis, failure_ttl }
    }

    fn key(identifier: &str) -> String {
        format!("{}{}", FAILURE_PREFIX, identifier)
    }
}

#[async_trait]
impl FailureLedger for RedisLedger {
    async fn record_failure(&self, identifier: &str) -> Result<u32, LedgerError> {
        let key = Self::key(identifier);
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.redis.clone();

        // MULTI/EXEC keeps increment and timestamp together
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hincr(&key, COUNT_FIELD, 1)
            .hset(&key, LAST_FAILURE_FIELD, now)
            .ignore();
        if let Some(ttl) = self.failure_ttl {
            pipe.expire(&key, ttl as i64).ignore();
        }

        let (count,): (i64,) = pipe.query_async(&mut conn).await?;
        let count = u32::try_from(count).map_err(|_| LedgerError::Corrupt {
            identifier: identifier.to_string(),
            reason: format!("count out of range: {}", count),
        })?;

        tracing::debug!(identifier = %identifier, count, "Login failure recorded");

        Ok(count)
    }

    async fn record_success(&self, identifier: &str) -> Result<(), LedgerError> {
        let mut conn = self.redis.clone();
        let removed: u32 = conn.del(Self::key(identifier)).await?;

        if removed > 0 {
            tracing::debug!(identifier = %identifier, "Failure count reset");
        }

        Ok(())
    }

    async fn failure_count(&self, identifier: &str) -> Result<u32, LedgerError> {
        let mut conn = self.redis.clone();
        let count: Option<i64> = conn.hget(Self::key(identifier), COUNT_FIELD).await?;

        match count {
            None => Ok(0),
            Some(c) if c < 0 => Err(LedgerError::Corrupt {
                identifier: identifier.to_string(),
                reason: format!("negative count: {}", c),
            }),
            Some(c) => Ok(u32::try_from(c).unwrap_or(u32::MAX)),
        }
    }

    async fn seed(&self, identifier: &str, count: u32) -> Result<(), LedgerError> {
        let key = Self::key(identifier);
        let mut conn = self.redis.clone();

        if count == 0 {
            let _: () = conn.del(&key).await?;
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(&key, COUNT_FIELD, count)
            .ignore()
            .hset(&key, LAST_FAILURE_FIELD, now)
            .ignore();
        if let Some(ttl) = self.failure_ttl {
            pipe.expire(&key, ttl as i64).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
