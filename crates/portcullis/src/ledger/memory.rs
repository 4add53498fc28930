//! Process-local ledger.

use async_trait::async_trait;
use portcullis_common::FailureRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{FailureLedger, LedgerError};

/// In-memory failure ledger for single-instance deployments
pub struct MemoryLedger {
    records: Mutex<HashMap<String, FailureRecord>>,
    /// Records older than this are dropped (None = never decay)
    failure_ttl: Option<u64>,
}

impl MemoryLedger {
    pub fn new(failure_ttl: Option<u64>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failure_ttl,
        }
    }

    pub fn failure_ttl(&self) -> Option<u64> {
        self.failure_ttl
    }

    /// Number of identifiers currently holding a record
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Snapshot of one record, if present and not expired.
    /// An expired record is evicted on the way.
    pub async fn record(&self, identifier: &str) -> Option<FailureRecord> {
        let mut records = self.records.lock().await;

        if records
            .get(identifier)
            .is_some_and(|r| r.is_expired(self.failure_ttl))
        {
            records.remove(identifier);
            tracing::debug!(identifier = %identifier, "Expired failure record evicted");
            return None;
        }

        records.get(identifier).cloned()
    }

    /// Drop every expired record. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        if self.failure_ttl.is_none() {
            return 0;
        }

        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(self.failure_ttl));
        before - records.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Background sweeper keeping the map bounded by the TTL window.
/// Does nothing when the ledger has no TTL.
pub async fn sweep_worker(ledger: Arc<MemoryLedger>, every: Duration) {
    if ledger.failure_ttl().is_none() {
        return;
    }

    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;

        let purged = ledger.purge_expired().await;
        if purged > 0 {
            let remaining = ledger.len().await;
            tracing::debug!(purged, remaining, "Failure records swept");
        }
    }
}

#[async_trait]
impl FailureLedger for MemoryLedger {
    async fn record_failure(&self, identifier: &str) -> Result<u32, LedgerError> {
        let mut records = self.records.lock().await;

        let record = records
            .entry(identifier.to_string())
            .or_insert_with(|| FailureRecord::new(identifier.to_string()));

        // An expired record restarts from zero instead of compounding
        if record.is_expired(self.failure_ttl) {
            record.count = 0;
        }
        record.bump();

        tracing::debug!(identifier = %identifier, count = record.count, "Login failure recorded");

        Ok(record.count)
    }

    async fn record_success(&self, identifier: &str) -> Result<(), LedgerError> {
        if self.records.lock().await.remove(identifier).is_some() {
            tracing::debug!(identifier = %identifier, "Failure count reset");
        }
        Ok(())
    }

    async fn failure_count(&self, identifier: &str) -> Result<u32, LedgerError> {
        Ok(self.record(identifier).await.map_or(0, |r| r.count))
    }

    async fn seed(&self, identifier: &str, count: u32) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        if count == 0 {
            records.remove(identifier);
            return Ok(());
        }

        let mut record = FailureRecord::new(identifier.to_string());
        record.count = count;
        records.insert(identifier.to_string(), record);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_identifier_reads_zero() {
        let ledger = MemoryLedger::default();
        assert_eq!(ledger.failure_count("192.168.1.101").await.unwrap(), 0);
        assert_eq!(ledger.len().await, 0);
    }

    #[tokio::test]
    async fn test_failures_accumulate_and_reset() {
        let ledger = MemoryLedger::default();

        assert_eq!(ledger.record_failure("192.168.1.101").await.unwrap(), 1);
        assert_eq!(ledger.record_failure("192.168.1.101").await.unwrap(), 2);
        assert_eq!(ledger.failure_count("192.168.1.101").await.unwrap(), 2);

        // Other identifiers are untouched
        assert_eq!(ledger.failure_count("192.168.1.102").await.unwrap(), 0);

        ledger.record_success("192.168.1.101").await.unwrap();
        assert_eq!(ledger.failure_count("192.168.1.101").await.unwrap(), 0);
        assert!(ledger.record("192.168.1.101").await.is_none());
    }

    #[tokio::test]
    async fn test_reset_on_clean_identifier_is_noop() {
        let ledger = MemoryLedger::default();
        tokio_test::assert_ok!(ledger.record_success("10.0.0.7").await);
        tokio_test::assert_ok!(ledger.record_success("10.0.0.7").await);
        assert_eq!(ledger.failure_count("10.0.0.7").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_overwrites_count() {
        let ledger = MemoryLedger::default();
        ledger.seed("10.0.0.1", 4).await.unwrap();
        assert_eq!(ledger.failure_count("10.0.0.1").await.unwrap(), 4);
        assert_eq!(ledger.record_failure("10.0.0.1").await.unwrap(), 5);

        ledger.seed("10.0.0.1", 0).await.unwrap();
        assert_eq!(ledger.failure_count("10.0.0.1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_record_reads_zero() {
        let ledger = MemoryLedger::new(Some(60));
        ledger.record_failure("10.0.0.1").await.unwrap();
        ledger.record_failure("10.0.0.1").await.unwrap();

        {
            let mut records = ledger.records.lock().await;
            let record = records.get_mut("10.0.0.1").unwrap();
            record.last_failure = chrono::Utc::now() - chrono::Duration::seconds(61);
        }

        assert_eq!(ledger.failure_count("10.0.0.1").await.unwrap(), 0);
        // Next failure starts a fresh streak
        assert_eq!(ledger.record_failure("10.0.0.1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let ledger = Arc::new(MemoryLedger::default());

        let mut handles = Vec::new();
        for _ in 0..64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_failure("203.0.113.9").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ledger.failure_count("203.0.113.9").await.unwrap(), 64);
    }

    async fn backdate(ledger: &MemoryLedger, identifier: &str, secs: i64) {
        let mut records = ledger.records.lock().await;
        let record = records.get_mut(identifier).unwrap();
        record.last_failure = chrono::Utc::now() - chrono::Duration::seconds(secs);
    }

    #[tokio::test]
    async fn test_expired_record_evicted_on_read() {
        let ledger = MemoryLedger::new(Some(60));
        ledger.record_failure("10.0.0.1").await.unwrap();
        ledger.record_failure("10.0.0.2").await.unwrap();
        assert_eq!(ledger.len().await, 2);

        backdate(&ledger, "10.0.0.1", 61).await;

        assert_eq!(ledger.failure_count("10.0.0.1").await.unwrap(), 0);
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.failure_count("10.0.0.2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_drops_only_expired_records() {
        let ledger = MemoryLedger::new(Some(60));
        for i in 0..10 {
            ledger.record_failure(&format!("198.51.100.{}", i)).await.unwrap();
        }
        for i in 0..7 {
            backdate(&ledger, &format!("198.51.100.{}", i), 120).await;
        }

        assert_eq!(ledger.purge_expired().await, 7);
        assert_eq!(ledger.len().await, 3);
        assert_eq!(ledger.failure_count("198.51.100.9").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_without_ttl_keeps_everything() {
        let ledger = MemoryLedger::default();
        ledger.record_failure("10.0.0.1").await.unwrap();
        backdate(&ledger, "10.0.0.1", 86_400).await;

        assert_eq!(ledger.purge_expired().await, 0);
        assert_eq!(ledger.failure_count("10.0.0.1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_worker_shrinks_map() {
        let ledger = Arc::new(MemoryLedger::new(Some(60)));
        ledger.record_failure("10.0.0.1").await.unwrap();
        ledger.record_failure("10.0.0.2").await.unwrap();
        backdate(&ledger, "10.0.0.1", 61).await;
        backdate(&ledger, "10.0.0.2", 61).await;

        let worker = tokio::spawn(sweep_worker(ledger.clone(), Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(ledger.len().await, 0);
        worker.abort();
    }
}
