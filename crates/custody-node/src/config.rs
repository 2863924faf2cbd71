//! # Node Configuration
//!
//! Runtime parameters read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CUSTODY_NODE_ID` | `custody-node` |
//! | `CUSTODY_FIDUCIARY_ID` | `master-fiduciary` |
//! | `CUSTODY_FIDUCIARY_DOC_CID` | unset: the fiduciary is hosted in-process |
//! | `CUSTODY_DATA_DIR` | `./data` |
//! | `CUSTODY_LEDGER_CAPACITY` | `1024` |
//! | `CUSTODY_LIST_PAGE_SIZE` | `0` (everything) |

use std::path::PathBuf;

use custody_protocol::CustodyConfig;
use shared_types::{ContentId, ParticipantId};
use thiserror::Error;

pub const ENV_NODE_ID: &str = "CUSTODY_NODE_ID";
pub const ENV_FIDUCIARY_ID: &str = "CUSTODY_FIDUCIARY_ID";
pub const ENV_FIDUCIARY_DOC_CID: &str = "CUSTODY_FIDUCIARY_DOC_CID";
pub const ENV_DATA_DIR: &str = "CUSTODY_DATA_DIR";
pub const ENV_LEDGER_CAPACITY: &str = "CUSTODY_LEDGER_CAPACITY";
pub const ENV_LIST_PAGE_SIZE: &str = "CUSTODY_LIST_PAGE_SIZE";

/// Broadcast buffer of the in-process ledger.
pub const DEFAULT_LEDGER_CAPACITY: usize = 1024;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    /// A variable is set to an empty string.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Participant this node runs as.
    pub node_id: ParticipantId,
    /// Custodian this node deposits with.
    pub fiduciary_id: ParticipantId,
    /// Published identity of a remote fiduciary.
    pub fiduciary_doc_cid: Option<ContentId>,
    /// Root directory for persistent stores.
    pub data_dir: PathBuf,
    /// Buffer size of the ledger broadcast channel.
    pub ledger_capacity: usize,
    /// Page size used when a list request asks for 0.
    pub list_page_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let custody = CustodyConfig::default();
        Self {
            node_id: custody.node_id,
            fiduciary_id: custody.master_fiduciary_id,
            fiduciary_doc_cid: None,
            data_dir: PathBuf::from("./data"),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            list_page_size: custody.default_page_size,
        }
    }
}

impl NodeConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id) = non_empty(&lookup, ENV_NODE_ID)? {
            config.node_id = ParticipantId::new(id);
        }
        if let Some(id) = non_empty(&lookup, ENV_FIDUCIARY_ID)? {
            config.fiduciary_id = ParticipantId::new(id);
        }
        if let Some(cid) = non_empty(&lookup, ENV_FIDUCIARY_DOC_CID)? {
            config.fiduciary_doc_cid = Some(ContentId::new(cid));
        }
        if let Some(dir) = non_empty(&lookup, ENV_DATA_DIR)? {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(capacity) = parse_usize(&lookup, ENV_LEDGER_CAPACITY)? {
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    name: ENV_LEDGER_CAPACITY,
                    expected: "positive integer",
                    value: capacity.to_string(),
                });
            }
            config.ledger_capacity = capacity;
        }
        if let Some(size) = parse_usize(&lookup, ENV_LIST_PAGE_SIZE)? {
            config.list_page_size = size;
        }

        Ok(config)
    }

    /// Whether this node is the custodian itself.
    pub fn is_custodian(&self) -> bool {
        self.node_id == self.fiduciary_id
    }

    /// A non-custodian without a published fiduciary document hosts one.
    pub fn hosts_fiduciary(&self) -> bool {
        !self.is_custodian() && self.fiduciary_doc_cid.is_none()
    }

    /// Protocol configuration for this node.
    pub fn custody_config(&self) -> CustodyConfig {
        CustodyConfig {
            node_id: self.node_id.clone(),
            master_fiduciary_id: self.fiduciary_id.clone(),
            default_page_size: self.list_page_size,
            peer_documents: self.fiduciary_doc_cid.iter().cloned().collect(),
            ..CustodyConfig::default()
        }
    }

    /// Protocol configuration for a co-hosted fiduciary.
    pub fn fiduciary_config(&self) -> CustodyConfig {
        CustodyConfig {
            node_id: self.fiduciary_id.clone(),
            master_fiduciary_id: self.fiduciary_id.clone(),
            default_page_size: self.list_page_size,
            ..CustodyConfig::default()
        }
    }

    /// Store directory for one hosted participant.
    pub fn store_path(&self, participant: &ParticipantId) -> PathBuf {
        self.data_dir.join(participant.as_str())
    }
}

fn non_empty<F>(lookup: &F, name: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(name)),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

fn parse_usize<F>(lookup: &F, name: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name)?
        .map(|value| {
            value.parse().map_err(|_| ConfigError::Invalid {
                name,
                expected: "integer",
                value,
            })
        })
        .transpose()
}
