//! Ledger adapter over the in-process transaction bus.

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{InMemoryLedger, LedgerPublisher};
use shared_types::LedgerTransaction;

use crate::domain::CustodyError;
use crate::ports::Ledger;

/// Submits transactions to a shared `InMemoryLedger`.
#[derive(Clone)]
pub struct BusLedger {
    inner: Arc<InMemoryLedger>,
}

impl BusLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Self {
        Self { inner }
    }

    /// The underlying bus, for subscribing.
    pub fn bus(&self) -> &Arc<InMemoryLedger> {
        &self.inner
    }
}

#[async_trait]
impl Ledger for BusLedger {
    async fn submit(&self, transaction: LedgerTransaction) -> Result<String, CustodyError> {
        if transaction.recipient_ids.is_empty() {
            return Err(CustodyError::ValidationError(
                "transaction has no recipients".into(),
            ));
        }
        let id = self.inner.submit(transaction).await;
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::LedgerFilter;
    use shared_types::{OrderReference, OrderRequest, Processor};

    #[tokio::test]
    async fn test_submit_reaches_subscriber() {
        let bus = Arc::new(InMemoryLedger::new());
        let mut sub = bus.subscribe(LedgerFilter::addressed_to("C".into()));
        let ledger = BusLedger::new(bus.clone());

        let tx = LedgerTransaction::new(
            Processor::FulfillRequest,
            "A".into(),
            vec!["C".into()],
            &OrderReference::generate(),
            &OrderRequest::default(),
        )
        .unwrap();
        let id = ledger.submit(tx).await.unwrap();

        let entry = sub.recv().await.unwrap();
        assert_eq!(entry.id.to_string(), id);
        assert_eq!(bus.height(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unaddressed_transaction() {
        let ledger = BusLedger::new(Arc::new(InMemoryLedger::new()));
        let tx = LedgerTransaction::new(
            Processor::Dump,
            "A".into(),
            vec![],
            &OrderReference::generate(),
            &OrderRequest::default(),
        )
        .unwrap();
        assert!(matches!(
            ledger.submit(tx).await,
            Err(CustodyError::ValidationError(_))
        ));
    }
}
