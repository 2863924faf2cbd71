//! # Ledger Entries
//!
//! The records stored in the ledger log and the filter subscriptions use
//! to select the ones addressed to them.

use serde::{Deserialize, Serialize};
use shared_types::{LedgerTransaction, ParticipantId, Processor};
use uuid::Uuid;

/// Identifier assigned to a submitted transaction.
pub type TransactionId = Uuid;

/// A transaction as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Assigned on submission.
    pub id: TransactionId,
    /// Position in the log, starting at 0.
    pub height: u64,
    /// The submitted transaction.
    pub transaction: LedgerTransaction,
}

/// Filter for subscribing to specific entries.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    /// Only entries addressed to this participant. `None` means any.
    pub recipient: Option<ParticipantId>,
    /// Processors to include. Empty means all processors.
    pub processors: Vec<Processor>,
}

impl LedgerFilter {
    /// Create a filter that accepts all entries.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for entries addressed to `participant`.
    #[must_use]
    pub fn addressed_to(participant: ParticipantId) -> Self {
        Self {
            recipient: Some(participant),
            processors: Vec::new(),
        }
    }

    /// Narrow the filter to the given processors.
    #[must_use]
    pub fn with_processors(mut self, processors: Vec<Processor>) -> Self {
        self.processors = processors;
        self
    }

    /// Check if an entry matches this filter.
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        let recipient_match = self
            .recipient
            .as_ref()
            .map_or(true, |r| entry.transaction.is_addressed_to(r));

        let processor_match =
            self.processors.is_empty() || self.processors.contains(&entry.transaction.processor);

        recipient_match && processor_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FulfillOrderSecretResponse, OrderReference};

    fn entry(processor: Processor, recipients: &[&str]) -> LedgerEntry {
        let tx = LedgerTransaction::new(
            processor,
            "C".into(),
            recipients.iter().map(|r| ParticipantId::from(*r)).collect(),
            &OrderReference::generate(),
            &FulfillOrderSecretResponse {
                order_part4_cid: "p4".into(),
                extension: Default::default(),
            },
        )
        .unwrap();
        LedgerEntry {
            id: Uuid::new_v4(),
            height: 0,
            transaction: tx,
        }
    }

    #[test]
    fn test_filter_all() {
        assert!(LedgerFilter::all().matches(&entry(Processor::Dump, &[])));
    }

    #[test]
    fn test_filter_by_recipient() {
        let filter = LedgerFilter::addressed_to("B".into());
        assert!(filter.matches(&entry(Processor::FulfillOrderSecretResponse, &["A", "B"])));
        assert!(!filter.matches(&entry(Processor::FulfillOrderSecretResponse, &["A"])));
    }

    #[test]
    fn test_filter_by_processor() {
        let filter = LedgerFilter::addressed_to("A".into())
            .with_processors(vec![Processor::FulfillResponse]);
        assert!(filter.matches(&entry(Processor::FulfillResponse, &["A"])));
        assert!(!filter.matches(&entry(Processor::OrderResponse, &["A"])));
    }
}
