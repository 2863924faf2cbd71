//! In-memory content-addressed store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::blake3_hash;
use shared_types::ContentId;
use tracing::debug;

use crate::domain::CustodyError;
use crate::ports::ContentStore;

/// Content store keyed by the hex BLAKE3 digest of each blob.
///
/// Shared by every participant in a single-process deployment.
#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, CustodyError> {
        let cid = ContentId::new(hex::encode(blake3_hash(&bytes)));
        debug!(cid = %cid, size = bytes.len(), "[content] Stored blob");
        self.blobs.write().insert(cid.clone(), bytes);
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> Result<Vec<u8>, CustodyError> {
        self.blobs
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| CustodyError::NotFound(format!("content {}", cid)))
    }
}
