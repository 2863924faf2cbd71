//! # Ledger Publisher
//!
//! Defines the submitting side of the ledger.

use crate::events::{LedgerEntry, LedgerFilter, TransactionId};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::LedgerTransaction;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Trait for submitting transactions to the ledger.
#[async_trait]
pub trait LedgerPublisher: Send + Sync {
    /// Append a transaction to the ledger and fan it out to subscribers.
    ///
    /// # Returns
    ///
    /// The id assigned to the transaction.
    async fn submit(&self, transaction: LedgerTransaction) -> TransactionId;

    /// Get the number of transactions recorded so far.
    fn height(&self) -> u64;
}

/// In-memory implementation of the ledger.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer delivery
/// and keeps every entry in an append-only log. Suitable for a single process
/// hosting several participants; a networked deployment would put a real
/// ledger client behind the same trait.
pub struct InMemoryLedger {
    /// Broadcast sender for entries.
    sender: broadcast::Sender<LedgerEntry>,

    /// Append-only log of every submitted entry.
    log: RwLock<Vec<LedgerEntry>>,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryLedger {
    /// Create a new ledger with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new ledger with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            log: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Subscribe to entries matching a filter.
    ///
    /// Only entries submitted after this call are delivered.
    #[must_use]
    pub fn subscribe(&self, filter: LedgerFilter) -> Subscription {
        debug!(recipient = ?filter.recipient, "[ledger] New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a recorded entry by id.
    #[must_use]
    pub fn entry(&self, id: &TransactionId) -> Option<LedgerEntry> {
        self.log.read().iter().find(|e| &e.id == id).cloned()
    }

    /// Snapshot of every recorded entry, in submission order.
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.log.read().clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPublisher for InMemoryLedger {
    async fn submit(&self, transaction: LedgerTransaction) -> TransactionId {
        // Append and fan out under one lock so delivery order matches heights.
        let (id, processor, receivers) = {
            let mut log = self.log.write();
            let entry = LedgerEntry {
                id: Uuid::new_v4(),
                height: log.len() as u64,
                transaction,
            };
            log.push(entry.clone());
            let id = entry.id;
            let processor = entry.transaction.processor;
            // Err only means nobody is listening; the entry stays in the log.
            (id, processor, self.sender.send(entry).unwrap_or(0))
        };

        debug!(
            tx_id = %id,
            processor = %processor,
            receivers = receivers,
            "[ledger] Transaction recorded"
        );
        id
    }

    fn height(&self) -> u64 {
        self.log.read().len() as u64
    }
}
