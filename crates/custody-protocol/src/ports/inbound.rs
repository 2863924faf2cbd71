//! # Inbound Ports
//!
//! API trait defining what a custody node can do for its callers.

use async_trait::async_trait;
use shared_types::{
    GetOrderResponse, LedgerTransaction, OrderListRequest, OrderListResponse, OrderReference,
    OrderRequest, OrderSecretRequest, ParticipantId, StatusResponse,
};

use crate::domain::{CustodyError, OrderReceipt};

/// Custody API - inbound port.
///
/// Errors are returned verbatim to the caller.
#[async_trait]
pub trait CustodyApi: Send + Sync {
    /// Open an order and ask the custodian to commit (phase 1).
    async fn order(&self, request: OrderRequest) -> Result<OrderReceipt, CustodyError>;

    /// Ask the custodian to release the committed secret (phase 3).
    async fn order_secret(&self, request: OrderSecretRequest) -> Result<OrderReceipt, CustodyError>;

    /// Latest known revision of an order.
    async fn get_order(&self, reference: OrderReference) -> Result<GetOrderResponse, CustodyError>;

    /// One page of locally known orders.
    fn order_list(&self, request: &OrderListRequest) -> Result<OrderListResponse, CustodyError>;

    /// Re-derive and resubmit the outbound transaction for the latest revision.
    async fn resubmit(&self, reference: OrderReference) -> Result<String, CustodyError>;

    /// Apply an inbound ledger transaction; returns the id of any follow-up
    /// transaction submitted.
    async fn handle_transaction(
        &self,
        transaction: &LedgerTransaction,
    ) -> Result<Option<String>, CustodyError>;

    /// Node status snapshot.
    fn status(&self) -> Result<StatusResponse, CustodyError>;

    /// This node's participant id.
    fn node_id(&self) -> &ParticipantId;

    /// The custodian this node deposits with.
    fn master_fiduciary_id(&self) -> &ParticipantId;
}
