//! # Custody Service
//!
//! Composition root: wires vault, chain, state machine and gateway over the
//! injected ports and exposes them through `CustodyApi`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_bus::Subscription;
use shared_types::{
    ContentId, GetOrderResponse, LedgerTransaction, OrderListRequest, OrderListResponse,
    OrderReference, OrderRequest, OrderSecretRequest, ParticipantId, Processor, StatusResponse,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::chain::DocumentChain;
use crate::config::CustodyConfig;
use crate::domain::{CustodyError, IdentityDocument, OrderDocument, OrderReceipt};
use crate::gateway::LedgerGateway;
use crate::machine::OrderStateMachine;
use crate::plugin::CustodyPlugin;
use crate::ports::{ContentStore, CustodyApi, KeyValueStore, Ledger, TimeSource};
use crate::vault::IdentityVault;

/// Name reported by `status`.
pub const APPLICATION_NAME: &str = "custody-protocol";

/// Port handles a service is built from.
#[derive(Clone)]
pub struct CustodyDependencies {
    pub content: Arc<dyn ContentStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub ledger: Arc<dyn Ledger>,
    pub time: Arc<dyn TimeSource>,
}

/// One participant's custody node.
pub struct CustodyService {
    config: CustodyConfig,
    vault: Arc<IdentityVault>,
    chain: Arc<DocumentChain>,
    machine: Arc<OrderStateMachine>,
    gateway: Arc<LedgerGateway>,
    time: Arc<dyn TimeSource>,
}

impl CustodyService {
    pub fn new(
        config: CustodyConfig,
        deps: CustodyDependencies,
        plugin: Arc<dyn CustodyPlugin>,
    ) -> Self {
        let vault = Arc::new(IdentityVault::new(
            Arc::clone(&deps.kv),
            Arc::clone(&deps.content),
            Arc::clone(&deps.time),
        ));
        let chain = Arc::new(DocumentChain::new(
            deps.content,
            deps.kv,
            Arc::clone(&deps.time),
        ));
        let machine = Arc::new(OrderStateMachine::new(
            config.node_id.clone(),
            config.master_fiduciary_id.clone(),
            Arc::clone(&vault),
            Arc::clone(&chain),
            plugin,
        ));
        let gateway = Arc::new(LedgerGateway::new(
            deps.ledger,
            Arc::clone(&machine),
            config.worker_queue_depth,
            config.worker_idle_timeout(),
        ));

        Self {
            config,
            vault,
            chain,
            machine,
            gateway,
            time: deps.time,
        }
    }

    /// Create secrets on first start, publish the identity document and
    /// register configured peers. Returns this node's document cid.
    pub async fn bootstrap(&self) -> Result<ContentId, CustodyError> {
        let node_id = &self.config.node_id;
        if !self.vault.has_secrets(node_id)? {
            self.vault.create_secrets(node_id)?;
        }
        let cid = self.vault.publish_identity(node_id).await?;
        for peer in &self.config.peer_documents {
            self.vault.register_identity(peer).await?;
        }
        info!(
            node = %node_id,
            fiduciary = %self.config.master_fiduciary_id,
            cid = %cid,
            peers = self.config.peer_documents.len(),
            "[custody] Node bootstrapped"
        );
        Ok(cid)
    }

    /// Learn a counterparty's identity document.
    pub async fn register_peer(&self, cid: &ContentId) -> Result<IdentityDocument, CustodyError> {
        self.vault.register_identity(cid).await
    }

    /// This node's identity document cid.
    pub fn identity_cid(&self) -> Result<ContentId, CustodyError> {
        self.vault.identity_cid(&self.config.node_id)
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    pub fn vault(&self) -> &Arc<IdentityVault> {
        &self.vault
    }

    pub fn chain(&self) -> &Arc<DocumentChain> {
        &self.chain
    }

    pub fn gateway(&self) -> &Arc<LedgerGateway> {
        &self.gateway
    }

    /// Run the inbound dispatch loop on a background task.
    pub fn spawn_gateway(
        &self,
        subscription: Subscription,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.gateway).run(subscription, shutdown))
    }

    /// Ask this node to decrypt and log its latest revision of `reference`.
    pub async fn dump(&self, reference: OrderReference) -> Result<String, CustodyError> {
        self.chain.latest_content_id(&reference)?;
        let tx = LedgerTransaction::new(
            Processor::Dump,
            self.config.node_id.clone(),
            vec![self.config.node_id.clone()],
            &reference,
            &serde_json::Value::Null,
        )?;
        self.gateway.submit(tx).await
    }

    /// Every revision of `reference` readable here, newest first.
    pub async fn order_history(
        &self,
        reference: &OrderReference,
    ) -> Result<Vec<(ContentId, OrderDocument)>, CustodyError> {
        let (cid, latest) = self.machine.latest_order(reference).await?;

        let mut signers = HashMap::new();
        for id in [
            &self.config.node_id,
            &self.config.master_fiduciary_id,
            &latest.principal_id,
        ] {
            if let Ok(doc) = self.vault.identity_document(id).await {
                signers.insert(id.clone(), doc);
            }
        }

        let me = self.vault.secrets(&self.config.node_id)?;
        self.chain.walk(&cid, &me, &signers).await
    }

    fn now_rfc3339(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.time.now() as i64, 0)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

#[async_trait]
impl CustodyApi for CustodyService {
    async fn order(&self, request: OrderRequest) -> Result<OrderReceipt, CustodyError> {
        let (receipt, outbound) = self.machine.open_order(request).await?;
        self.gateway.submit(outbound).await?;
        Ok(receipt)
    }

    async fn order_secret(&self, request: OrderSecretRequest) -> Result<OrderReceipt, CustodyError> {
        let (receipt, outbound) = self.machine.order_secret(request).await?;
        self.gateway.submit(outbound).await?;
        Ok(receipt)
    }

    async fn get_order(&self, reference: OrderReference) -> Result<GetOrderResponse, CustodyError> {
        let (order_cid, order) = self.machine.latest_order(&reference).await?;
        Ok(GetOrderResponse {
            order_cid,
            order: serde_json::to_string(&order)?,
        })
    }

    fn order_list(&self, request: &OrderListRequest) -> Result<OrderListResponse, CustodyError> {
        let per_page = match request.per_page {
            0 => self.config.default_page_size,
            n => n,
        };
        Ok(OrderListResponse {
            order_references: self
                .chain
                .list_orders(request.page, per_page, request.sort_by)?,
        })
    }

    async fn resubmit(&self, reference: OrderReference) -> Result<String, CustodyError> {
        let outbound = self.machine.resubmit(reference).await?;
        self.gateway.submit(outbound).await
    }

    async fn handle_transaction(
        &self,
        transaction: &LedgerTransaction,
    ) -> Result<Option<String>, CustodyError> {
        self.gateway.process(transaction).await
    }

    fn status(&self) -> Result<StatusResponse, CustodyError> {
        Ok(StatusResponse {
            application: APPLICATION_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            node_id: self.config.node_id.to_string(),
            master_fiduciary_id: self.config.master_fiduciary_id.to_string(),
            order_count: self.chain.order_count()?,
            time_stamp: self.now_rfc3339(),
        })
    }

    fn node_id(&self) -> &ParticipantId {
        &self.config.node_id
    }

    fn master_fiduciary_id(&self) -> &ParticipantId {
        &self.config.master_fiduciary_id
    }
}
