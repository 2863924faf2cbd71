//! # Custody Node Runtime
//!
//! Hosts a custody participant over an in-process ledger and content store.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Open one key-value store per hosted participant
//! 3. Bootstrap the co-hosted fiduciary (when no remote document is given)
//! 4. Bootstrap this node and cross-register identities
//! 5. Spawn a ledger gateway per participant
//!
//! ```text
//! ┌────────────┐   FulfillOrderRequest    ┌────────────┐
//! │ principal  │ ───────────────────────→ │ fiduciary  │
//! │  (node)    │ ←─────────────────────── │ (hosted or │
//! └────────────┘   FulfillOrderResponse   │  remote)   │
//!        │                                └────────────┘
//!        └──────────── InMemoryLedger ─────────┘
//! ```

#![warn(clippy::all)]

pub mod config;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use custody_protocol::{
    BusLedger, CustodyApi, CustodyDependencies, CustodyPlugin, CustodyService,
    InMemoryContentStore, KeyValueStore, SafeguardSecretPlugin, SystemTimeSource,
};
use shared_bus::{InMemoryLedger, LedgerFilter};
use shared_types::{ContentId, ParticipantId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use config::{ConfigError, NodeConfig};

/// How long shutdown waits for each gateway to stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The running node: this participant plus an optional co-hosted fiduciary.
pub struct NodeRuntime {
    config: NodeConfig,
    bus: Arc<InMemoryLedger>,
    node: Arc<CustodyService>,
    fiduciary: Option<Arc<CustodyService>>,
    gateways: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    /// Wire stores and services. Nothing runs until `start`.
    pub fn new(config: NodeConfig) -> Result<Self> {
        info!(node = %config.node_id, fiduciary = %config.fiduciary_id, "Creating custody node runtime");

        let bus = Arc::new(InMemoryLedger::with_capacity(config.ledger_capacity));
        let content = Arc::new(InMemoryContentStore::new());
        let time = Arc::new(SystemTimeSource);
        let plugin: Arc<dyn CustodyPlugin> = Arc::new(SafeguardSecretPlugin::new());

        let deps = |participant: &ParticipantId| -> Result<CustodyDependencies> {
            Ok(CustodyDependencies {
                content: content.clone(),
                kv: open_kv_store(&config, participant)?,
                ledger: Arc::new(BusLedger::new(Arc::clone(&bus))),
                time: time.clone(),
            })
        };

        let node = Arc::new(CustodyService::new(
            config.custody_config(),
            deps(&config.node_id)?,
            Arc::clone(&plugin),
        ));
        let fiduciary = if config.hosts_fiduciary() {
            Some(Arc::new(CustodyService::new(
                config.fiduciary_config(),
                deps(&config.fiduciary_id)?,
                plugin,
            )))
        } else {
            None
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            bus,
            node,
            fiduciary,
            gateways: Vec::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Bootstrap identities and start the gateways. Returns this node's
    /// identity document cid.
    pub async fn start(&mut self) -> Result<ContentId> {
        info!("===========================================");
        info!("  Custody Node v{}", custody_protocol::VERSION);
        info!("===========================================");

        // Step 1: The fiduciary must publish before the node can register it
        let fiduciary_cid = match &self.fiduciary {
            Some(fiduciary) => Some(
                fiduciary
                    .bootstrap()
                    .await
                    .context("Failed to bootstrap hosted fiduciary")?,
            ),
            None => None,
        };

        // Step 2: Bootstrap this node (registers any remote fiduciary document)
        let node_cid = self
            .node
            .bootstrap()
            .await
            .context("Failed to bootstrap node")?;

        // Step 3: Cross-register with the hosted fiduciary
        if let (Some(fiduciary), Some(fiduciary_cid)) = (&self.fiduciary, &fiduciary_cid) {
            self.node
                .register_peer(fiduciary_cid)
                .await
                .context("Failed to register fiduciary identity")?;
            fiduciary
                .register_peer(&node_cid)
                .await
                .context("Failed to register node identity with fiduciary")?;
        }

        // Step 4: Spawn gateways
        let gateways: Vec<_> = self
            .services()
            .map(|service| {
                let subscription = self
                    .bus
                    .subscribe(LedgerFilter::addressed_to(service.node_id().clone()));
                service.spawn_gateway(subscription, self.shutdown_rx.clone())
            })
            .collect();
        self.gateways.extend(gateways);

        info!(
            node = %self.config.node_id,
            cid = %node_cid,
            hosted_fiduciary = self.fiduciary.is_some(),
            data_dir = ?self.config.data_dir,
            "Custody node running"
        );
        Ok(node_cid)
    }

    /// Signal the gateways and wait for them to stop.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No gateway was listening for shutdown");
        }
        for handle in self.gateways {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Gateway did not stop within the grace period");
            }
        }
        info!("Shutdown complete");
    }

    /// This participant's service.
    pub fn node(&self) -> &Arc<CustodyService> {
        &self.node
    }

    /// The co-hosted fiduciary, if any.
    pub fn fiduciary(&self) -> Option<&Arc<CustodyService>> {
        self.fiduciary.as_ref()
    }

    /// The shared ledger bus.
    pub fn bus(&self) -> &Arc<InMemoryLedger> {
        &self.bus
    }

    fn services(&self) -> impl Iterator<Item = &Arc<CustodyService>> {
        std::iter::once(&self.node).chain(self.fiduciary.iter())
    }
}

#[cfg(feature = "rocksdb")]
fn open_kv_store(config: &NodeConfig, participant: &ParticipantId) -> Result<Arc<dyn KeyValueStore>> {
    let path = config.store_path(participant);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create data dir {}", path.display()))?;
    let store = rocksdb_store::RocksDbStore::open_default(&path)
        .with_context(|| format!("Failed to open store for {}", participant))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_kv_store(
    _config: &NodeConfig,
    _participant: &ParticipantId,
) -> Result<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(custody_protocol::InMemoryKVStore::new()))
}
