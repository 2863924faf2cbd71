//! # Document Chain
//!
//! The append-only, cid-linked sequence of order revisions.
//!
//! Publishing is the single visibility point: a revision is sealed, stored
//! and only then recorded in the local index. Everything before that is
//! in-memory and leaves no trace on failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared_types::{ContentId, Extension, OrderReference, ParticipantId, SortOrder};
use tracing::debug;

use crate::domain::{
    invariant_phase_order, invariant_revision_extends, Commitment, CustodyError,
    IdentityDocument, OrderDocument, OrderIndexEntry, OrderKind, OrderState, RedemptionRequest,
    SecretRelease,
};
use crate::ports::{ContentStore, KeyValueStore, TimeSource};
use crate::vault::IdentitySecrets;

use super::envelope::SignedEnvelope;
use super::index::OrderIndex;

/// Upper bound on revisions per order (phases 1 to 4).
const MAX_REVISIONS: usize = 4;

/// Builds, seals, stores and retrieves order revisions.
pub struct DocumentChain {
    content: Arc<dyn ContentStore>,
    index: OrderIndex,
    time: Arc<dyn TimeSource>,
}

impl DocumentChain {
    pub fn new(
        content: Arc<dyn ContentStore>,
        kv: Arc<dyn KeyValueStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            content,
            index: OrderIndex::new(kv),
            time,
        }
    }

    /// Build a fresh phase-1 document.
    pub fn create_order(
        &self,
        beneficiary_id: Option<ParticipantId>,
        principal_id: ParticipantId,
    ) -> OrderDocument {
        OrderDocument {
            reference: OrderReference::generate(),
            kind: OrderKind::SafeguardSecret,
            principal_id,
            beneficiary_id,
            created_at: self.time.now(),
            commitment: None,
            redemption_request: None,
            secret_release: None,
            extension: Extension::new(),
        }
    }

    /// Seal `order` for `recipients` (the publisher is always included),
    /// store it and record it as the latest revision.
    pub async fn publish(
        &self,
        order: &OrderDocument,
        publisher: &IdentitySecrets,
        recipients: &[&IdentityDocument],
    ) -> Result<ContentId, CustodyError> {
        invariant_phase_order(order)?;

        let mut sealed_for = vec![(
            publisher.participant_id.clone(),
            publisher.encapsulation.public_key(),
        )];
        for doc in recipients {
            if sealed_for.iter().all(|(id, _)| id != &doc.participant_id) {
                sealed_for.push((doc.participant_id.clone(), doc.encapsulation_key()?));
            }
        }

        let plaintext = serde_json::to_vec(order)?;
        let envelope = SignedEnvelope::seal(
            &publisher.participant_id,
            &publisher.signing,
            &sealed_for,
            &plaintext,
        )?;
        let cid = self.content.put(envelope.to_bytes()?).await?;

        self.record(&order.reference, &cid, order.state())?;
        debug!(
            reference = %order.reference,
            cid = %cid,
            state = %order.state(),
            recipients = sealed_for.len(),
            "[custody] Published revision"
        );
        Ok(cid)
    }

    /// Retrieve, verify and decrypt a revision.
    ///
    /// `signer` must be the participant that published it.
    pub async fn fetch(
        &self,
        cid: &ContentId,
        reader: &IdentitySecrets,
        signer: &IdentityDocument,
    ) -> Result<OrderDocument, CustodyError> {
        let envelope = self.envelope(cid).await?;
        if envelope.sender_id != signer.participant_id {
            return Err(CustodyError::IntegrityError(format!(
                "revision {} was published by {}, expected {}",
                cid, envelope.sender_id, signer.participant_id
            )));
        }
        envelope.verify(&signer.signing_key()?)?;

        let plaintext = envelope.open(&reader.participant_id, &reader.encapsulation)?;
        let order: OrderDocument = serde_json::from_slice(&plaintext)?;
        invariant_phase_order(&order)?;
        Ok(order)
    }

    /// Who published a revision, read from the unencrypted header.
    pub async fn envelope_sender(&self, cid: &ContentId) -> Result<ParticipantId, CustodyError> {
        Ok(self.envelope(cid).await?.sender_id)
    }

    pub fn latest(&self, reference: &OrderReference) -> Result<Option<OrderIndexEntry>, CustodyError> {
        self.index.get(reference)
    }

    /// Cid of the newest revision this participant knows of.
    pub fn latest_content_id(&self, reference: &OrderReference) -> Result<ContentId, CustodyError> {
        self.index
            .get(reference)?
            .map(|entry| entry.content_id)
            .ok_or_else(|| CustodyError::NotFound(format!("order {}", reference)))
    }

    /// Track an explicitly fetched revision.
    pub fn record(
        &self,
        reference: &OrderReference,
        cid: &ContentId,
        state: OrderState,
    ) -> Result<OrderIndexEntry, CustodyError> {
        self.index.record(reference, cid, state, self.now_utc())
    }

    /// Append phase 2. Returns `false` when the identical commitment is
    /// already present.
    pub fn append_commitment(
        &self,
        order: &mut OrderDocument,
        previous_cid: &ContentId,
        commitment_public_key: String,
    ) -> Result<bool, CustodyError> {
        invariant_phase_order(order)?;
        if let Some(existing) = &order.commitment {
            return replay(
                order,
                "commitment",
                existing.commitment_public_key == commitment_public_key
                    && &existing.previous_cid == previous_cid,
            );
        }
        order.commitment = Some(Commitment {
            commitment_public_key,
            previous_cid: previous_cid.clone(),
            timestamp: self.time.now(),
        });
        Ok(true)
    }

    /// Append phase 3. Requires phase 2.
    pub fn append_redemption_request(
        &self,
        order: &mut OrderDocument,
        previous_cid: &ContentId,
        redemption_token: String,
        beneficiary_encrypted_data: String,
    ) -> Result<bool, CustodyError> {
        invariant_phase_order(order)?;
        if order.commitment.is_none() {
            return Err(CustodyError::OutOfOrder(format!(
                "order {} has no commitment",
                order.reference
            )));
        }
        if let Some(existing) = &order.redemption_request {
            return replay(
                order,
                "redemption request",
                existing.redemption_token == redemption_token
                    && existing.beneficiary_encrypted_data == beneficiary_encrypted_data
                    && &existing.previous_cid == previous_cid,
            );
        }
        order.redemption_request = Some(RedemptionRequest {
            redemption_token,
            beneficiary_encrypted_data,
            previous_cid: previous_cid.clone(),
            timestamp: self.time.now(),
        });
        Ok(true)
    }

    /// Append phase 4. Requires phase 3.
    pub fn append_secret_release(
        &self,
        order: &mut OrderDocument,
        previous_cid: &ContentId,
        secret: String,
    ) -> Result<bool, CustodyError> {
        invariant_phase_order(order)?;
        if order.redemption_request.is_none() {
            return Err(CustodyError::OutOfOrder(format!(
                "order {} has no redemption request",
                order.reference
            )));
        }
        if let Some(existing) = &order.secret_release {
            return replay(
                order,
                "secret release",
                existing.secret == secret && &existing.previous_cid == previous_cid,
            );
        }
        order.secret_release = Some(SecretRelease {
            secret,
            previous_cid: previous_cid.clone(),
            timestamp: self.time.now(),
        });
        Ok(true)
    }

    /// Follow previous-cids from `cid` back to phase 1, newest first.
    ///
    /// Each revision must be signed by its envelope sender (looked up in
    /// `signers`) and extend its predecessor by exactly one phase.
    pub async fn walk(
        &self,
        cid: &ContentId,
        reader: &IdentitySecrets,
        signers: &HashMap<ParticipantId, IdentityDocument>,
    ) -> Result<Vec<(ContentId, OrderDocument)>, CustodyError> {
        let mut revisions: Vec<(ContentId, OrderDocument)> = Vec::new();
        let mut next = Some(cid.clone());

        while let Some(current) = next.take() {
            if revisions.len() == MAX_REVISIONS {
                return Err(CustodyError::IntegrityError(format!(
                    "chain from {} exceeds {} revisions",
                    cid, MAX_REVISIONS
                )));
            }
            let sender = self.envelope_sender(&current).await?;
            let signer = signers
                .get(&sender)
                .ok_or_else(|| CustodyError::NotFound(format!("identity of {}", sender)))?;
            let order = self.fetch(&current, reader, signer).await?;

            if let Some((_, later)) = revisions.last() {
                invariant_revision_extends(&order, later)?;
            }
            next = order.previous_cid().cloned();
            revisions.push((current, order));
        }
        Ok(revisions)
    }

    pub fn list_orders(
        &self,
        page: usize,
        per_page: usize,
        sort: SortOrder,
    ) -> Result<Vec<OrderReference>, CustodyError> {
        self.index.list(page, per_page, sort)
    }

    pub fn order_count(&self) -> Result<usize, CustodyError> {
        self.index.count()
    }

    async fn envelope(&self, cid: &ContentId) -> Result<SignedEnvelope, CustodyError> {
        SignedEnvelope::from_bytes(&self.content.get(cid).await?)
    }

    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.time.now() as i64, 0).unwrap_or_default()
    }
}

fn replay(order: &OrderDocument, phase: &str, identical: bool) -> Result<bool, CustodyError> {
    if identical {
        debug!(reference = %order.reference, phase, "[custody] Revision already present");
        Ok(false)
    } else {
        Err(CustodyError::OutOfOrder(format!(
            "order {} already has a different {}",
            order.reference, phase
        )))
    }
}
