//! Per-reference serialization of transitions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::OrderReference;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle locks are pruned once the table grows past this.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per order reference.
///
/// Transitions on different references run concurrently; transitions on the
/// same reference queue behind each other.
#[derive(Default)]
pub struct ReferenceLocks {
    locks: Mutex<HashMap<OrderReference, Arc<AsyncMutex<()>>>>,
}

impl ReferenceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `reference`.
    pub async fn lock(&self, reference: OrderReference) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(reference).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of references with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_reference_is_exclusive() {
        let locks = ReferenceLocks::new();
        let reference = OrderReference::generate();

        let guard = locks.lock(reference).await;
        let waiting =
            tokio::time::timeout(Duration::from_millis(50), locks.lock(reference)).await;
        assert!(waiting.is_err());

        drop(guard);
        let _guard = locks.lock(reference).await;
    }

    #[tokio::test]
    async fn test_distinct_references_do_not_block() {
        let locks = ReferenceLocks::new();
        let _a = locks.lock(OrderReference::generate()).await;
        let _b = locks.lock(OrderReference::generate()).await;
        assert_eq!(locks.len(), 2);
    }
}
