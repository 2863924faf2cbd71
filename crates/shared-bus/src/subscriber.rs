//! # Ledger Subscriber
//!
//! Defines the delivery side of the ledger.

use crate::events::{LedgerEntry, LedgerFilter};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The ledger was dropped.
    #[error("Ledger closed")]
    Closed,
}

/// A subscription handle for receiving ledger entries.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<LedgerEntry>,

    /// Filter for this subscription.
    filter: LedgerFilter,
}

impl Subscription {
    /// Create a new subscription.
    pub(crate) fn new(receiver: broadcast::Receiver<LedgerEntry>, filter: LedgerFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next entry that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(entry)` - The next matching entry
    /// - `None` - The channel was closed (ledger dropped)
    pub async fn recv(&mut self) -> Option<LedgerEntry> {
        loop {
            let entry = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        lagged = count,
                        recipient = ?self.filter.recipient,
                        "[ledger] Subscriber lagged, entries dropped"
                    );
                    continue;
                }
            };

            if self.filter.matches(&entry) {
                return Some(entry);
            }
        }
    }

    /// Try to receive the next matching entry without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(entry))` - An entry was available and matched
    /// - `Ok(None)` - No entry available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<LedgerEntry>, SubscriptionError> {
        loop {
            let entry = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&entry) {
                return Ok(Some(entry));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &LedgerFilter {
        &self.filter
    }
}
