//! # Custody Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::{ContentId, ParticipantId};

/// Default per-reference worker queue depth.
pub const DEFAULT_WORKER_QUEUE_DEPTH: usize = 64;

/// Default idle period after which a per-reference worker retires.
pub const DEFAULT_WORKER_IDLE_TIMEOUT_MS: u64 = 30_000;

/// Default page size for `order_list` when a request leaves it at 0.
pub const DEFAULT_PAGE_SIZE: usize = 0;

/// Configuration for one custody participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyConfig {
    /// This node's participant id.
    pub node_id: ParticipantId,
    /// Custodian this node deposits with. A custodian names itself.
    pub master_fiduciary_id: ParticipantId,
    /// Queue depth of each per-reference worker.
    pub worker_queue_depth: usize,
    /// Milliseconds a worker waits on an empty queue before retiring.
    pub worker_idle_timeout_ms: u64,
    /// Page size applied when a list request asks for 0 (0 = everything).
    pub default_page_size: usize,
    /// Identity documents registered at bootstrap.
    pub peer_documents: Vec<ContentId>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            node_id: ParticipantId::new("custody-node"),
            master_fiduciary_id: ParticipantId::new("master-fiduciary"),
            worker_queue_depth: DEFAULT_WORKER_QUEUE_DEPTH,
            worker_idle_timeout_ms: DEFAULT_WORKER_IDLE_TIMEOUT_MS,
            default_page_size: DEFAULT_PAGE_SIZE,
            peer_documents: Vec::new(),
        }
    }
}

impl CustodyConfig {
    /// Config for `node_id` depositing with `master_fiduciary_id`.
    pub fn new(node_id: impl Into<String>, master_fiduciary_id: impl Into<String>) -> Self {
        Self {
            node_id: ParticipantId::new(node_id),
            master_fiduciary_id: ParticipantId::new(master_fiduciary_id),
            ..Self::default()
        }
    }

    /// Idle period after which a per-reference worker retires.
    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }

    /// Testing config with small queues and short-lived workers.
    pub fn for_testing(node_id: &str, master_fiduciary_id: &str) -> Self {
        Self {
            worker_queue_depth: 8,
            worker_idle_timeout_ms: 200,
            ..Self::new(node_id, master_fiduciary_id)
        }
    }

    /// Whether this node is its own custodian.
    pub fn is_custodian(&self) -> bool {
        self.node_id == self.master_fiduciary_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custodian_names_itself() {
        assert!(CustodyConfig::for_testing("C", "C").is_custodian());
        assert!(!CustodyConfig::for_testing("A", "C").is_custodian());
    }

    #[test]
    fn test_serde_defaults_camel_case() {
        let json = serde_json::to_string(&CustodyConfig::default()).unwrap();
        assert!(json.contains("\"masterFiduciaryId\":\"master-fiduciary\""));
        assert!(json.contains("\"workerQueueDepth\":64"));
        assert!(json.contains("\"workerIdleTimeoutMs\":30000"));
    }
}
