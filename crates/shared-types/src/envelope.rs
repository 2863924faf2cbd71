//! # `LedgerTransaction` Envelope
//!
//! The addressed, tagged wrapper dispatched over the ledger to tell a
//! counterparty that a new order revision is ready.
//!
//! ## Properties
//!
//! - **Processor routing**: `processor` names the phase handler on the receiver.
//! - **Envelope Authority**: `sender_id` is the sole source of sender identity.
//! - **Reference tag**: `tags["reference"]` is always present; receivers
//!   dispatch to the per-order worker by it.
//! - **At-most-once**: no correlation id, no acknowledgement.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::entities::{OrderReference, ParticipantId};
use crate::errors::TypeError;

/// Tag key carrying the order reference.
pub const TAG_REFERENCE: &str = "reference";

/// Phase handler a transaction is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Processor {
    /// Principal → custodian: phase 1 is published, please commit.
    FulfillRequest,
    /// Custodian → principal: phase 2 is published.
    FulfillResponse,
    /// Principal → custodian: phase 3 is published, please release.
    FulfillOrderSecretRequest,
    /// Custodian → principal and beneficiary: phase 4 is published.
    FulfillOrderSecretResponse,
    /// Principal's notification that the deposit completed.
    OrderResponse,
    /// Beneficiary's notification that the secret was delivered.
    OrderSecretResponse,
    /// Debug aid: decrypt and log the referenced revision.
    Dump,
}

impl Processor {
    /// Wire name of the processor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Processor::FulfillRequest => "FulfillRequest",
            Processor::FulfillResponse => "FulfillResponse",
            Processor::FulfillOrderSecretRequest => "FulfillOrderSecretRequest",
            Processor::FulfillOrderSecretResponse => "FulfillOrderSecretResponse",
            Processor::OrderResponse => "OrderResponse",
            Processor::OrderSecretResponse => "OrderSecretResponse",
            Processor::Dump => "Dump",
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Processor {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FulfillRequest" => Ok(Processor::FulfillRequest),
            "FulfillResponse" => Ok(Processor::FulfillResponse),
            "FulfillOrderSecretRequest" => Ok(Processor::FulfillOrderSecretRequest),
            "FulfillOrderSecretResponse" => Ok(Processor::FulfillOrderSecretResponse),
            "OrderResponse" => Ok(Processor::OrderResponse),
            "OrderSecretResponse" => Ok(Processor::OrderSecretResponse),
            "Dump" => Ok(Processor::Dump),
            other => Err(TypeError::UnknownProcessor(other.to_string())),
        }
    }
}

/// A transaction dispatched over the ledger.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Phase handler on the receiving side.
    pub processor: Processor,

    /// Participant that submitted the transaction.
    pub sender_id: ParticipantId,

    /// Intended recipients, in order.
    pub recipient_ids: Vec<ParticipantId>,

    /// JSON-encoded request for the next phase.
    #[serde_as(as = "Bytes")]
    pub payload: Vec<u8>,

    /// Indexing tags; always contains `reference`.
    pub tags: BTreeMap<String, String>,
}

impl LedgerTransaction {
    /// Build a transaction for `reference` with a JSON-encoded payload.
    pub fn new<T: Serialize>(
        processor: Processor,
        sender_id: ParticipantId,
        recipient_ids: Vec<ParticipantId>,
        reference: &OrderReference,
        payload: &T,
    ) -> Result<Self, TypeError> {
        let payload = serde_json::to_vec(payload).map_err(|e| TypeError::Payload(e.to_string()))?;
        let mut tags = BTreeMap::new();
        tags.insert(TAG_REFERENCE.to_string(), reference.to_string());
        Ok(Self {
            processor,
            sender_id,
            recipient_ids,
            payload,
            tags,
        })
    }

    /// Add or replace an extra tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The raw `reference` tag, if present.
    pub fn reference_tag(&self) -> Option<&str> {
        self.tags.get(TAG_REFERENCE).map(String::as_str)
    }

    /// The parsed order reference.
    pub fn reference(&self) -> Result<OrderReference, TypeError> {
        self.reference_tag()
            .ok_or(TypeError::MissingTag(TAG_REFERENCE))?
            .parse()
    }

    /// Whether `participant` is among the recipients.
    pub fn is_addressed_to(&self, participant: &ParticipantId) -> bool {
        self.recipient_ids.iter().any(|r| r == participant)
    }

    /// Decode the JSON payload.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        serde_json::from_slice(&self.payload).map_err(|e| TypeError::Payload(e.to_string()))
    }
}
