//! Local `reference -> latest revision` index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared_types::{ContentId, OrderReference, SortOrder};

use crate::domain::{page_bounds, CustodyError, OrderIndexEntry, OrderState};
use crate::ports::KeyValueStore;

const ORDER_PREFIX: &str = "order:";

/// Index of the orders this participant has published or fetched.
pub struct OrderIndex {
    kv: Arc<dyn KeyValueStore>,
}

impl OrderIndex {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Record `content_id` as the latest revision of `reference`.
    ///
    /// The state never moves backwards: recording an older revision over a
    /// newer one leaves the entry untouched and returns it.
    pub fn record(
        &self,
        reference: &OrderReference,
        content_id: &ContentId,
        state: OrderState,
        now: DateTime<Utc>,
    ) -> Result<OrderIndexEntry, CustodyError> {
        let existing = self.get(reference)?;
        if let Some(entry) = &existing {
            if entry.state > state {
                return Ok(entry.clone());
            }
        }

        let entry = OrderIndexEntry {
            reference: *reference,
            content_id: content_id.clone(),
            state,
            created_at: existing.map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.kv.put(&order_key(reference), &serde_json::to_vec(&entry)?)?;
        Ok(entry)
    }

    pub fn get(&self, reference: &OrderReference) -> Result<Option<OrderIndexEntry>, CustodyError> {
        match self.kv.get(&order_key(reference))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// One page of references sorted by creation time, ties by reference.
    pub fn list(
        &self,
        page: usize,
        per_page: usize,
        sort: SortOrder,
    ) -> Result<Vec<OrderReference>, CustodyError> {
        let mut entries = self.entries()?;
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.as_uuid().cmp(b.reference.as_uuid()))
        });
        if sort == SortOrder::DateCreatedDesc {
            entries.reverse();
        }
        let bounds = page_bounds(entries.len(), page, per_page);
        Ok(entries[bounds].iter().map(|e| e.reference).collect())
    }

    pub fn count(&self) -> Result<usize, CustodyError> {
        Ok(self.kv.prefix_scan(ORDER_PREFIX.as_bytes())?.len())
    }

    fn entries(&self) -> Result<Vec<OrderIndexEntry>, CustodyError> {
        self.kv
            .prefix_scan(ORDER_PREFIX.as_bytes())?
            .into_iter()
            .map(|(_, raw)| Ok(serde_json::from_slice(&raw)?))
            .collect()
    }
}

fn order_key(reference: &OrderReference) -> Vec<u8> {
    format!("{}{}", ORDER_PREFIX, reference).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn index() -> OrderIndex {
        OrderIndex::new(Arc::new(InMemoryKVStore::new()))
    }

    #[test]
    fn test_record_keeps_creation_time() {
        let index = index();
        let reference = OrderReference::generate();
        index
            .record(&reference, &"p1".into(), OrderState::Deposited, at(100))
            .unwrap();
        let entry = index
            .record(&reference, &"p2".into(), OrderState::CommitmentReceived, at(200))
            .unwrap();

        assert_eq!(entry.created_at, at(100));
        assert_eq!(entry.updated_at, at(200));
        assert_eq!(entry.content_id.as_str(), "p2");
    }

    #[test]
    fn test_record_never_regresses() {
        let index = index();
        let reference = OrderReference::generate();
        index
            .record(&reference, &"p2".into(), OrderState::CommitmentReceived, at(100))
            .unwrap();
        index
            .record(&reference, &"p1".into(), OrderState::Deposited, at(200))
            .unwrap();

        let entry = index.get(&reference).unwrap().unwrap();
        assert_eq!(entry.content_id.as_str(), "p2");
        assert_eq!(entry.state, OrderState::CommitmentReceived);
    }

    #[test]
    fn test_list_sorted_and_paged() {
        let index = index();
        let refs: Vec<_> = (0..5).map(|_| OrderReference::generate()).collect();
        for (i, reference) in refs.iter().enumerate() {
            index
                .record(reference, &"p1".into(), OrderState::Deposited, at(100 + i as i64))
                .unwrap();
        }

        assert_eq!(index.count().unwrap(), 5);
        assert_eq!(
            index.list(0, 2, SortOrder::DateCreatedAsc).unwrap(),
            refs[0..2].to_vec()
        );
        assert_eq!(
            index.list(2, 2, SortOrder::DateCreatedAsc).unwrap(),
            vec![refs[4]]
        );
        assert_eq!(
            index.list(0, 1, SortOrder::DateCreatedDesc).unwrap(),
            vec![refs[4]]
        );
        assert!(index.list(3, 2, SortOrder::DateCreatedAsc).unwrap().is_empty());
        assert_eq!(index.list(0, 0, SortOrder::DateCreatedAsc).unwrap().len(), 5);
    }
}
