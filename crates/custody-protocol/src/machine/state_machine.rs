//! # Order State Machine
//!
//! Drives an order through its four phases.
//!
//! ```text
//! Created --order--> Deposited --FulfillRequest@C--> CommitmentReceived
//!   --order_secret--> RedemptionRequested --FulfillOrderSecretRequest@C--> SecretReleased
//! ```
//!
//! Every transition follows the same shape: fetch and check the inbound
//! revision, ask the plugin for the next phase's content, append, publish,
//! and hand the outbound transaction back to the caller for dispatch. The
//! machine never submits to the ledger itself.
//!
//! Re-delivery is idempotent: a handler whose phase is already recorded in
//! the local index returns `Ok(None)` without touching anything.

use std::sync::Arc;

use serde::Serialize;
use shared_crypto::BlsSignature;
use shared_types::{
    ContentId, Extension, FulfillOrderRequest, FulfillOrderResponse, FulfillOrderSecretRequest,
    FulfillOrderSecretResponse, LedgerTransaction, OrderReference, OrderRequest, OrderResponse,
    OrderSecretRequest, OrderSecretResponse, ParticipantId, Processor,
};
use tracing::{debug, info};

use crate::chain::DocumentChain;
use crate::domain::{
    invariant_chain_link, invariant_commitment_matches, invariant_principal, invariant_same_order,
    invariant_state, CustodyError, IdentityDocument, OrderDocument, OrderReceipt, OrderState,
};
use crate::plugin::CustodyPlugin;
use crate::vault::IdentityVault;

use super::locks::ReferenceLocks;

/// Extension key naming the beneficiary's identity document on
/// `FulfillOrderSecretRequest`.
pub const BENEFICIARY_DOCUMENT_KEY: &str = "beneficiaryDocumentCid";

/// Policy-free orchestration of the order phases for one participant.
pub struct OrderStateMachine {
    node_id: ParticipantId,
    fiduciary_id: ParticipantId,
    vault: Arc<IdentityVault>,
    chain: Arc<DocumentChain>,
    plugin: Arc<dyn CustodyPlugin>,
    locks: ReferenceLocks,
}

impl OrderStateMachine {
    pub fn new(
        node_id: ParticipantId,
        fiduciary_id: ParticipantId,
        vault: Arc<IdentityVault>,
        chain: Arc<DocumentChain>,
        plugin: Arc<dyn CustodyPlugin>,
    ) -> Self {
        Self {
            node_id,
            fiduciary_id,
            vault,
            chain,
            plugin,
            locks: ReferenceLocks::new(),
        }
    }

    pub fn node_id(&self) -> &ParticipantId {
        &self.node_id
    }

    pub fn fiduciary_id(&self) -> &ParticipantId {
        &self.fiduciary_id
    }

    /// Locally recorded state of an order, if known.
    pub fn state_of(&self, reference: &OrderReference) -> Result<Option<OrderState>, CustodyError> {
        Ok(self.chain.latest(reference)?.map(|entry| entry.state))
    }

    // =========================================================================
    // Locally initiated phases
    // =========================================================================

    /// Phase 1: build and publish a deposit, addressed to the custodian.
    pub async fn open_order(
        &self,
        request: OrderRequest,
    ) -> Result<(OrderReceipt, LedgerTransaction), CustodyError> {
        self.plugin.validate_order_request(&request)?;

        let me = self.vault.secrets(&self.node_id)?;
        let custodian = self.vault.identity_document(&self.fiduciary_id).await?;
        let beneficiary_id = match &request.beneficiary_id_document_cid {
            Some(cid) => Some(self.vault.register_identity(cid).await?.participant_id),
            None => None,
        };

        let mut order = self.chain.create_order(beneficiary_id, self.node_id.clone());
        self.plugin.prepare_deposit(&mut order, &request)?;

        let cid = self.chain.publish(&order, &me, &[&custodian]).await?;
        let outbound = self.build_outbound(&order, &cid, Extension::new())?;

        info!(
            reference = %order.reference,
            cid = %cid,
            custodian = %self.fiduciary_id,
            plugin = self.plugin.name(),
            "[custody] Order deposited"
        );
        Ok((receipt(&order, cid), outbound))
    }

    /// Phase 3: ask the custodian to release the committed secret.
    pub async fn order_secret(
        &self,
        request: OrderSecretRequest,
    ) -> Result<(OrderReceipt, LedgerTransaction), CustodyError> {
        self.plugin.validate_order_secret_request(&request)?;

        let reference = request.order_reference;
        let _guard = self.locks.lock(reference).await;

        // Step 1: Only a committed, not yet redeemed order can be redeemed
        let entry = self
            .chain
            .latest(&reference)?
            .ok_or_else(|| CustodyError::NotFound(format!("order {}", reference)))?;
        if entry.state != OrderState::CommitmentReceived {
            return Err(CustodyError::OutOfOrder(format!(
                "order {} is {}, expected {}",
                reference,
                entry.state,
                OrderState::CommitmentReceived
            )));
        }

        // Step 2: Load the commitment revision
        let me = self.vault.secrets(&self.node_id)?;
        let custodian = self.vault.identity_document(&self.fiduciary_id).await?;
        let mut order = self
            .chain
            .fetch(&entry.content_id, &me, &custodian)
            .await?;
        invariant_principal(&order, &self.node_id)?;

        // Step 3: Resolve the beneficiary, applying an override if given
        let beneficiary = match &request.beneficiary_id_document_cid {
            Some(cid) => {
                let doc = self.vault.register_identity(cid).await?;
                order.beneficiary_id = Some(doc.participant_id.clone());
                doc
            }
            None => {
                let id = order.beneficiary_id.as_ref().ok_or_else(|| {
                    CustodyError::ValidationError(format!(
                        "order {} has no beneficiary",
                        reference
                    ))
                })?;
                self.vault.identity_document(id).await?
            }
        };

        // Step 4: Append and publish phase 3
        let payload = self.plugin.produce_redemption_payload(&order, &beneficiary)?;
        let token = me.signing.sign(reference.to_string().as_bytes()).to_hex();
        self.chain
            .append_redemption_request(&mut order, &entry.content_id, token, payload)?;
        let cid = self
            .chain
            .publish(&order, &me, &[&custodian, &beneficiary])
            .await?;

        let outbound = self.build_outbound(&order, &cid, request.extension)?;
        info!(
            reference = %reference,
            cid = %cid,
            beneficiary = %beneficiary.participant_id,
            "[custody] Redemption requested"
        );
        Ok((receipt(&order, cid), outbound))
    }

    /// Re-derive the outbound transaction for the latest revision this node
    /// published.
    pub async fn resubmit(&self, reference: OrderReference) -> Result<LedgerTransaction, CustodyError> {
        let _guard = self.locks.lock(reference).await;

        let cid = self.chain.latest_content_id(&reference)?;
        let publisher = self.chain.envelope_sender(&cid).await?;
        if publisher != self.node_id {
            return Err(CustodyError::OutOfOrder(format!(
                "latest revision of {} was published by {}",
                reference, publisher
            )));
        }

        let me = self.vault.secrets(&self.node_id)?;
        let own = self.vault.identity_document(&self.node_id).await?;
        let order = self.chain.fetch(&cid, &me, &own).await?;
        debug!(reference = %reference, cid = %cid, "[custody] Resubmitting");
        self.build_outbound(&order, &cid, Extension::new())
    }

    // =========================================================================
    // Ledger-triggered phases
    // =========================================================================

    /// Route an inbound transaction to its phase handler.
    pub async fn handle(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        if !tx.is_addressed_to(&self.node_id) {
            return Err(CustodyError::ValidationError(format!(
                "{} transaction from {} is not addressed to {}",
                tx.processor, tx.sender_id, self.node_id
            )));
        }
        debug!(
            processor = %tx.processor,
            sender = %tx.sender_id,
            reference = ?tx.reference_tag(),
            "[custody] Handling transaction"
        );

        match tx.processor {
            Processor::FulfillRequest => self.handle_fulfill_request(tx).await,
            Processor::FulfillResponse => self.handle_fulfill_response(tx).await,
            Processor::FulfillOrderSecretRequest => {
                self.handle_fulfill_order_secret_request(tx).await
            }
            Processor::FulfillOrderSecretResponse => {
                self.handle_fulfill_order_secret_response(tx).await
            }
            Processor::OrderResponse => {
                let response: OrderResponse = tx.decode_payload()?;
                info!(
                    reference = %response.order_reference,
                    commitment = %response.commitment,
                    "[custody] Order committed"
                );
                Ok(None)
            }
            Processor::OrderSecretResponse => {
                let response: OrderSecretResponse = tx.decode_payload()?;
                info!(
                    reference = %response.order_reference,
                    commitment = %response.commitment,
                    "[custody] Secret delivered"
                );
                Ok(None)
            }
            Processor::Dump => self.handle_dump(tx).await,
        }
    }

    /// Custodian: phase 1 arrived, commit.
    async fn handle_fulfill_request(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        let request: FulfillOrderRequest = tx.decode_payload()?;
        let reference = tx.reference()?;
        let _guard = self.locks.lock(reference).await;

        // Step 1: Skip re-delivery
        if let Some(entry) = self.chain.latest(&reference)? {
            if entry.state >= OrderState::CommitmentReceived {
                debug!(reference = %reference, "[custody] Commitment already published");
                return Ok(None);
            }
        }

        // Step 2: The envelope sender is the principal
        let principal = self.vault.register_identity(&request.document_cid).await?;
        expect_sender(tx, &principal)?;

        // Step 3: Fetch and check phase 1
        let me = self.vault.secrets(&self.node_id)?;
        let mut order = self
            .chain
            .fetch(&request.order_part1_cid, &me, &principal)
            .await?;
        invariant_same_order(&order, &reference)?;
        invariant_principal(&order, &tx.sender_id)?;
        invariant_state(&order, OrderState::Deposited)?;

        // Step 4: Commit
        let commitment = self.plugin.prepare_commitment(&order, &me)?;
        self.chain
            .append_commitment(&mut order, &request.order_part1_cid, commitment)?;
        let cid = self.chain.publish(&order, &me, &[&principal]).await?;

        info!(reference = %reference, cid = %cid, principal = %principal.participant_id, "[custody] Commitment published");
        self.build_outbound(&order, &cid, Extension::new()).map(Some)
    }

    /// Principal: phase 2 arrived, record it and report.
    async fn handle_fulfill_response(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        let response: FulfillOrderResponse = tx.decode_payload()?;
        let reference = tx.reference()?;
        let _guard = self.locks.lock(reference).await;

        let entry = self
            .chain
            .latest(&reference)?
            .ok_or_else(|| CustodyError::NotFound(format!("order {}", reference)))?;
        if entry.state >= OrderState::CommitmentReceived {
            debug!(reference = %reference, "[custody] Commitment already recorded");
            return Ok(None);
        }
        if tx.sender_id != self.fiduciary_id {
            return Err(CustodyError::IntegrityError(format!(
                "commitment for {} sent by {}, not the custodian",
                reference, tx.sender_id
            )));
        }

        let me = self.vault.secrets(&self.node_id)?;
        let custodian = self.vault.identity_document(&tx.sender_id).await?;
        let order = self
            .chain
            .fetch(&response.order_part2_cid, &me, &custodian)
            .await?;
        invariant_same_order(&order, &reference)?;
        invariant_principal(&order, &self.node_id)?;
        invariant_state(&order, OrderState::CommitmentReceived)?;
        invariant_chain_link(&order, &entry.content_id)?;

        let report = self.plugin.prepare_order_response(&order)?;
        self.chain.record(
            &reference,
            &response.order_part2_cid,
            OrderState::CommitmentReceived,
        )?;

        info!(reference = %reference, cid = %response.order_part2_cid, "[custody] Commitment received");
        self.outbound(
            Processor::OrderResponse,
            vec![self.node_id.clone()],
            &reference,
            &report,
        )
        .map(Some)
    }

    /// Custodian: phase 3 arrived, release.
    async fn handle_fulfill_order_secret_request(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        let request: FulfillOrderSecretRequest = tx.decode_payload()?;
        let reference = tx.reference()?;
        let _guard = self.locks.lock(reference).await;

        // Step 1: Only orders this custodian committed to, released once
        let entry = self
            .chain
            .latest(&reference)?
            .ok_or_else(|| CustodyError::NotFound(format!("order {}", reference)))?;
        if entry.state >= OrderState::SecretReleased {
            debug!(reference = %reference, "[custody] Secret already released");
            return Ok(None);
        }

        // Step 2: Fetch and check phase 3 against our own phase 2
        let principal = self
            .vault
            .register_identity(&request.sender_document_cid)
            .await?;
        expect_sender(tx, &principal)?;

        let me = self.vault.secrets(&self.node_id)?;
        let mut order = self
            .chain
            .fetch(&request.order_part3_cid, &me, &principal)
            .await?;
        invariant_same_order(&order, &reference)?;
        invariant_principal(&order, &tx.sender_id)?;
        invariant_state(&order, OrderState::RedemptionRequested)?;
        invariant_chain_link(&order, &entry.content_id)?;

        // Step 3: Redemption token is the principal's signature of the reference
        let token = order
            .redemption_request
            .as_ref()
            .map(|r| r.redemption_token.as_str())
            .unwrap_or_default();
        let signature = BlsSignature::from_hex(token)
            .map_err(|_| CustodyError::IntegrityError("malformed redemption token".into()))?;
        principal
            .signing_key()?
            .verify_strict(reference.to_string().as_bytes(), &signature)
            .map_err(|_| {
                CustodyError::IntegrityError(format!("redemption token for {} rejected", reference))
            })?;

        // Step 4: The stored commitment must still be ours
        let committed = order
            .commitment
            .as_ref()
            .map(|c| c.commitment_public_key.clone())
            .unwrap_or_default();
        invariant_commitment_matches(&committed, &self.plugin.prepare_commitment(&order, &me)?)?;

        // Step 5: Release to principal and beneficiary
        let beneficiary = self.beneficiary_document(&order, &request.extension).await?;
        let secret = self.plugin.release_secret(&order, &me)?;
        self.chain
            .append_secret_release(&mut order, &request.order_part3_cid, secret)?;
        let cid = self
            .chain
            .publish(&order, &me, &[&principal, &beneficiary])
            .await?;

        info!(
            reference = %reference,
            cid = %cid,
            beneficiary = %beneficiary.participant_id,
            "[custody] Secret released"
        );
        self.build_outbound(&order, &cid, Extension::new()).map(Some)
    }

    /// Principal or beneficiary: phase 4 arrived.
    ///
    /// The beneficiary derives the final secret and checks it against the
    /// phase-2 commitment before reporting delivery.
    async fn handle_fulfill_order_secret_response(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        let response: FulfillOrderSecretResponse = tx.decode_payload()?;
        let reference = tx.reference()?;
        let _guard = self.locks.lock(reference).await;

        let entry = self.chain.latest(&reference)?;
        if let Some(entry) = &entry {
            if entry.state.is_terminal() {
                debug!(reference = %reference, "[custody] Release already recorded");
                return Ok(None);
            }
        }
        if tx.sender_id != self.fiduciary_id {
            return Err(CustodyError::IntegrityError(format!(
                "release for {} sent by {}, not the custodian",
                reference, tx.sender_id
            )));
        }

        let me = self.vault.secrets(&self.node_id)?;
        let custodian = self.vault.identity_document(&tx.sender_id).await?;
        let order = self
            .chain
            .fetch(&response.order_part4_cid, &me, &custodian)
            .await?;
        invariant_same_order(&order, &reference)?;
        invariant_state(&order, OrderState::SecretReleased)?;
        if let Some(entry) = &entry {
            if entry.state == OrderState::RedemptionRequested {
                invariant_chain_link(&order, &entry.content_id)?;
            }
        }

        if order.beneficiary_id.as_ref() != Some(&self.node_id) {
            self.chain
                .record(&reference, &response.order_part4_cid, OrderState::SecretReleased)?;
            info!(reference = %reference, "[custody] Release recorded");
            return Ok(None);
        }

        let delivered = self.plugin.produce_final_secret(&order, &me)?;
        let committed = order
            .commitment
            .as_ref()
            .map(|c| c.commitment_public_key.as_str())
            .unwrap_or_default();
        invariant_commitment_matches(committed, &delivered.commitment)?;

        self.chain
            .record(&reference, &response.order_part4_cid, OrderState::SecretReleased)?;
        info!(reference = %reference, "[custody] Secret verified against commitment");
        self.outbound(
            Processor::OrderSecretResponse,
            vec![self.node_id.clone()],
            &reference,
            &OrderSecretResponse {
                secret: delivered.secret,
                commitment: delivered.commitment,
                order_reference: reference,
                extension: order.extension.clone(),
            },
        )
        .map(Some)
    }

    /// Decrypt and log the latest known revision of the tagged order.
    async fn handle_dump(
        &self,
        tx: &LedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, CustodyError> {
        let reference = tx.reference()?;
        let (cid, order) = self.latest_order(&reference).await?;
        info!(
            reference = %reference,
            cid = %cid,
            state = %order.state(),
            order = %serde_json::to_string(&order)?,
            "[custody] Dump"
        );
        Ok(None)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Latest known revision, decrypted with whichever signer published it.
    pub async fn latest_order(
        &self,
        reference: &OrderReference,
    ) -> Result<(ContentId, OrderDocument), CustodyError> {
        let cid = self.chain.latest_content_id(reference)?;
        let publisher = self.chain.envelope_sender(&cid).await?;
        let signer = self.vault.identity_document(&publisher).await?;
        let me = self.vault.secrets(&self.node_id)?;
        let order = self.chain.fetch(&cid, &me, &signer).await?;
        Ok((cid, order))
    }

    async fn beneficiary_document(
        &self,
        order: &OrderDocument,
        extension: &Extension,
    ) -> Result<IdentityDocument, CustodyError> {
        let beneficiary_id = order.beneficiary_id.as_ref().ok_or_else(|| {
            CustodyError::ValidationError(format!("order {} has no beneficiary", order.reference))
        })?;
        let doc = match extension.get(BENEFICIARY_DOCUMENT_KEY) {
            Some(cid) => self.vault.register_identity(&ContentId::new(cid.as_str())).await?,
            None => self.vault.identity_document(beneficiary_id).await?,
        };
        if &doc.participant_id != beneficiary_id {
            return Err(CustodyError::IntegrityError(format!(
                "beneficiary document is for {}, order names {}",
                doc.participant_id, beneficiary_id
            )));
        }
        Ok(doc)
    }

    /// The transaction announcing `cid`, published by this node.
    fn build_outbound(
        &self,
        order: &OrderDocument,
        cid: &ContentId,
        mut extension: Extension,
    ) -> Result<LedgerTransaction, CustodyError> {
        let reference = order.reference;
        match order.state() {
            OrderState::Created | OrderState::Deposited => self.outbound(
                Processor::FulfillRequest,
                vec![self.fiduciary_id.clone()],
                &reference,
                &FulfillOrderRequest {
                    document_cid: self.vault.identity_cid(&self.node_id)?,
                    order_part1_cid: cid.clone(),
                    extension,
                },
            ),
            OrderState::CommitmentReceived => self.outbound(
                Processor::FulfillResponse,
                vec![order.principal_id.clone()],
                &reference,
                &FulfillOrderResponse {
                    order_part2_cid: cid.clone(),
                    extension,
                },
            ),
            OrderState::RedemptionRequested => {
                if let Some(beneficiary) = &order.beneficiary_id {
                    extension.insert(
                        BENEFICIARY_DOCUMENT_KEY.to_string(),
                        self.vault.identity_cid(beneficiary)?.to_string(),
                    );
                }
                self.outbound(
                    Processor::FulfillOrderSecretRequest,
                    vec![self.fiduciary_id.clone()],
                    &reference,
                    &FulfillOrderSecretRequest {
                        sender_document_cid: self.vault.identity_cid(&self.node_id)?,
                        order_part3_cid: cid.clone(),
                        extension,
                    },
                )
            }
            OrderState::SecretReleased => {
                let mut recipients = vec![order.principal_id.clone()];
                if let Some(beneficiary) = &order.beneficiary_id {
                    if !recipients.contains(beneficiary) {
                        recipients.push(beneficiary.clone());
                    }
                }
                self.outbound(
                    Processor::FulfillOrderSecretResponse,
                    recipients,
                    &reference,
                    &FulfillOrderSecretResponse {
                        order_part4_cid: cid.clone(),
                        extension,
                    },
                )
            }
        }
    }

    fn outbound<T: Serialize>(
        &self,
        processor: Processor,
        recipients: Vec<ParticipantId>,
        reference: &OrderReference,
        payload: &T,
    ) -> Result<LedgerTransaction, CustodyError> {
        Ok(LedgerTransaction::new(
            processor,
            self.node_id.clone(),
            recipients,
            reference,
            payload,
        )?)
    }
}

fn receipt(order: &OrderDocument, cid: ContentId) -> OrderReceipt {
    OrderReceipt {
        order_reference: order.reference,
        order_cid: cid,
        state: order.state(),
    }
}

/// The envelope sender must own the identity document it presented.
fn expect_sender(tx: &LedgerTransaction, doc: &IdentityDocument) -> Result<(), CustodyError> {
    if doc.participant_id != tx.sender_id {
        return Err(CustodyError::IntegrityError(format!(
            "{} presented the identity of {}",
            tx.sender_id, doc.participant_id
        )));
    }
    Ok(())
}
