//! # Domain Entities
//!
//! The order document, its phase revisions and the published identity.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{BlsPublicKey, EncapsulationPublicKey};
use shared_types::{ContentId, Extension, OrderReference, ParticipantId, Timestamp};

use super::errors::CustodyError;
use super::value_objects::OrderState;

/// What an order represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Custody of a secret released on request.
    #[default]
    #[serde(rename = "Safeguard_Secret")]
    SafeguardSecret,
}

/// Phase 2: the custodian's public commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    /// Public value the released secret must match.
    pub commitment_public_key: String,
    /// Content id of the phase-1 revision.
    pub previous_cid: ContentId,
    /// When the commitment was appended.
    pub timestamp: Timestamp,
}

/// Phase 3: the principal's redemption request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    /// The order reference signed by the requester (hex BLS signature).
    pub redemption_token: String,
    /// Payload sealed to the beneficiary; opaque to the custodian.
    pub beneficiary_encrypted_data: String,
    /// Content id of the phase-2 revision.
    pub previous_cid: ContentId,
    /// When the request was appended.
    pub timestamp: Timestamp,
}

/// Phase 4: the custodian's release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRelease {
    /// Released private material.
    pub secret: String,
    /// Content id of the phase-3 revision.
    pub previous_cid: ContentId,
    /// When the release was appended.
    pub timestamp: Timestamp,
}

/// The unit of custody state.
///
/// Phase revisions are additive: each one is set once and a later one is
/// only present when every earlier one is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDocument {
    /// Immutable primary key.
    pub reference: OrderReference,
    /// Discriminator.
    #[serde(rename = "type")]
    pub kind: OrderKind,
    /// Who opened the order.
    pub principal_id: ParticipantId,
    /// Who receives the secret; may change until phase 3.
    pub beneficiary_id: Option<ParticipantId>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Phase 2.
    pub commitment: Option<Commitment>,
    /// Phase 3.
    pub redemption_request: Option<RedemptionRequest>,
    /// Phase 4.
    pub secret_release: Option<SecretRelease>,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

impl OrderDocument {
    /// State implied by the phases present.
    pub fn state(&self) -> OrderState {
        OrderState::of(self)
    }

    /// Content id the newest revision links back to, if any.
    pub fn previous_cid(&self) -> Option<&ContentId> {
        if let Some(release) = &self.secret_release {
            return Some(&release.previous_cid);
        }
        if let Some(request) = &self.redemption_request {
            return Some(&request.previous_cid);
        }
        self.commitment.as_ref().map(|c| &c.previous_cid)
    }

    /// The document as it was one revision earlier.
    pub fn predecessor(&self) -> Option<OrderDocument> {
        let mut prior = self.clone();
        if prior.secret_release.take().is_some()
            || prior.redemption_request.take().is_some()
            || prior.commitment.take().is_some()
        {
            Some(prior)
        } else {
            None
        }
    }
}

/// Public key material for one participant.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    /// Whose keys these are.
    pub participant_id: ParticipantId,
    /// BLS12-381 verification key (compressed G1).
    #[serde_as(as = "Bytes")]
    pub signing_public_key: [u8; 48],
    /// Encapsulation key (compressed secp256k1 point).
    #[serde_as(as = "Bytes")]
    pub encapsulation_public_key: [u8; 33],
    /// When the document was published.
    pub created_at: Timestamp,
}

impl IdentityDocument {
    /// Parsed signing key.
    pub fn signing_key(&self) -> Result<BlsPublicKey, CustodyError> {
        Ok(BlsPublicKey::from_bytes(&self.signing_public_key)?)
    }

    /// Parsed encapsulation key.
    pub fn encapsulation_key(&self) -> Result<EncapsulationPublicKey, CustodyError> {
        Ok(EncapsulationPublicKey::from_bytes(self.encapsulation_public_key)?)
    }
}

/// Stored form of an identity document: the document and a signature over
/// its JSON encoding by the key it publishes.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedIdentity {
    /// JSON-encoded `IdentityDocument`.
    #[serde_as(as = "Bytes")]
    pub document: Vec<u8>,
    /// Self-signature (compressed G2).
    #[serde_as(as = "Bytes")]
    pub signature: [u8; 96],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OrderDocument {
        OrderDocument {
            reference: OrderReference::generate(),
            kind: OrderKind::SafeguardSecret,
            principal_id: "A".into(),
            beneficiary_id: Some("B".into()),
            created_at: 1_000,
            commitment: None,
            redemption_request: None,
            secret_release: None,
            extension: Extension::new(),
        }
    }

    #[test]
    fn test_kind_wire_name() {
        let json = serde_json::to_string(&order()).unwrap();
        assert!(json.contains("\"type\":\"Safeguard_Secret\""));
    }

    #[test]
    fn test_predecessor_strips_newest_phase() {
        let mut doc = order();
        assert!(doc.predecessor().is_none());

        doc.commitment = Some(Commitment {
            commitment_public_key: "pub123".into(),
            previous_cid: "p1".into(),
            timestamp: 1_001,
        });
        let prior = doc.predecessor().unwrap();
        assert!(prior.commitment.is_none());
        assert_eq!(doc.previous_cid().unwrap().as_str(), "p1");
    }
}
