//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the custody protocol requires the host to provide. Every
//! component receives its handles explicitly at construction.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ContentId, LedgerTransaction, Timestamp};

use crate::domain::{CustodyError, KVStoreError};

/// Content-addressed blob store.
///
/// Production: a networked store behind the same trait.
/// Testing: `InMemoryContentStore`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their content id.
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, CustodyError>;

    /// Fetch bytes by content id. `NotFound` when absent.
    async fn get(&self, cid: &ContentId) -> Result<Vec<u8>, CustodyError>;
}

/// Local key-value store for seeds, the identity directory and the order index.
///
/// Production: `RocksDbStore` (custody-node, `rocksdb` feature).
/// Testing: `InMemoryKVStore`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Store `value` only if `key` is absent, as one atomic step.
    /// Returns `false` and leaves the stored value untouched otherwise.
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool, KVStoreError>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// Iterate over keys with a prefix.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;
}

/// Ledger client: submits transactions for delivery to their recipients.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a transaction; returns the ledger's transaction id.
    async fn submit(&self, transaction: LedgerTransaction) -> Result<String, CustodyError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Manually advanced clock.
#[derive(Debug)]
pub struct MockTimeSource {
    now: AtomicU64,
}

impl MockTimeSource {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Ledger that records submissions instead of delivering them.
#[derive(Default)]
pub struct RecordingLedger {
    submitted: Mutex<Vec<LedgerTransaction>>,
    /// Should fail?
    pub should_fail: bool,
}

impl RecordingLedger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions submitted so far.
    pub fn submitted(&self) -> Vec<LedgerTransaction> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn submit(&self, transaction: LedgerTransaction) -> Result<String, CustodyError> {
        if self.should_fail {
            return Err(CustodyError::TransportError("Mock failure".to_string()));
        }
        let mut submitted = self.submitted.lock();
        submitted.push(transaction);
        Ok(format!("mock-tx-{}", submitted.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{OrderReference, OrderRequest, Processor};

    #[test]
    fn test_mock_time_advances() {
        let clock = MockTimeSource::new(1_000);
        clock.advance(5);
        assert_eq!(clock.now(), 1_005);
    }

    #[tokio::test]
    async fn test_recording_ledger() {
        let ledger = RecordingLedger::new();
        let tx = LedgerTransaction::new(
            Processor::Dump,
            "A".into(),
            vec!["A".into()],
            &OrderReference::generate(),
            &OrderRequest::default(),
        )
        .unwrap();

        assert_eq!(ledger.submit(tx).await.unwrap(), "mock-tx-1");
        assert_eq!(ledger.submitted().len(), 1);

        let failing = RecordingLedger {
            should_fail: true,
            ..Default::default()
        };
        let tx = ledger.submitted().remove(0);
        assert!(matches!(
            failing.submit(tx).await,
            Err(CustodyError::TransportError(_))
        ));
    }
}
