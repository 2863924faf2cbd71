//! # Safeguard Secret Plugin
//!
//! The custodian derives one secp256k1 key pair per order:
//!
//! ```text
//! scalar = HMAC-SHA256(custodian seed, "safeguard-secret/" || reference || counter)
//! ```
//!
//! with `counter` starting at 0 and bumped in the (negligible) case the
//! output is not a valid scalar. Phase 2 publishes the compressed public key,
//! phase 4 releases the private key. The phase-3 payload is a note naming the
//! order and beneficiary, sealed to the beneficiary's encapsulation key; only
//! the beneficiary can open it to claim the release.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared_crypto::{public_key_from_private_hex, SealedBox, Secp256k1KeyPair};
use shared_types::{OrderReference, ParticipantId};
use tracing::debug;

use super::{CustodyPlugin, FinalSecret};
use crate::domain::{CustodyError, IdentityDocument, OrderDocument};
use crate::vault::IdentitySecrets;

type HmacSha256 = Hmac<Sha256>;

const DERIVATION_LABEL: &[u8] = b"safeguard-secret/";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedemptionNote {
    order_reference: OrderReference,
    beneficiary_id: ParticipantId,
}

/// Plugin for `OrderKind::SafeguardSecret`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafeguardSecretPlugin;

impl SafeguardSecretPlugin {
    pub fn new() -> Self {
        Self
    }

    /// The per-order key pair of `custodian`.
    pub fn order_key(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<Secp256k1KeyPair, CustodyError> {
        let reference = order.reference.to_string();
        for counter in 0..=u8::MAX {
            let mut mac = HmacSha256::new_from_slice(custodian.seed().as_bytes())
                .map_err(|e| CustodyError::ValidationError(e.to_string()))?;
            mac.update(DERIVATION_LABEL);
            mac.update(reference.as_bytes());
            mac.update(&[counter]);
            let scalar: [u8; 32] = mac.finalize().into_bytes().into();
            if let Ok(pair) = Secp256k1KeyPair::from_bytes(scalar) {
                return Ok(pair);
            }
        }
        Err(CustodyError::IntegrityError(format!(
            "no valid order key for {}",
            order.reference
        )))
    }
}

impl CustodyPlugin for SafeguardSecretPlugin {
    fn name(&self) -> &'static str {
        "Safeguard_Secret"
    }

    fn prepare_commitment(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError> {
        Ok(self.order_key(order, custodian)?.public_key().to_hex())
    }

    fn produce_redemption_payload(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentityDocument,
    ) -> Result<String, CustodyError> {
        let note = serde_json::to_vec(&RedemptionNote {
            order_reference: order.reference,
            beneficiary_id: beneficiary.participant_id.clone(),
        })?;
        let sealed = beneficiary.encapsulation_key()?.seal(&note)?;
        Ok(hex::encode(sealed.to_bytes()))
    }

    fn release_secret(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError> {
        Ok(self.order_key(order, custodian)?.to_hex())
    }

    fn produce_final_secret(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentitySecrets,
    ) -> Result<FinalSecret, CustodyError> {
        let request = order.redemption_request.as_ref().ok_or_else(|| {
            CustodyError::OutOfOrder(format!("order {} has no redemption request", order.reference))
        })?;
        let release = order.secret_release.as_ref().ok_or_else(|| {
            CustodyError::OutOfOrder(format!("order {} has no secret release", order.reference))
        })?;

        let sealed = hex::decode(&request.beneficiary_encrypted_data)
            .map_err(|e| CustodyError::DecryptError(format!("redemption payload: {}", e)))?;
        let sealed = SealedBox::from_bytes(&sealed)
            .map_err(|e| CustodyError::DecryptError(e.to_string()))?;
        let note = beneficiary
            .encapsulation
            .open(&sealed)
            .map_err(|e| CustodyError::DecryptError(e.to_string()))?;
        let note: RedemptionNote = serde_json::from_slice(&note)?;

        if note.order_reference != order.reference
            || note.beneficiary_id != beneficiary.participant_id
        {
            return Err(CustodyError::IntegrityError(format!(
                "redemption note does not name order {} for {}",
                order.reference, beneficiary.participant_id
            )));
        }

        let commitment = public_key_from_private_hex(&release.secret)?;
        debug!(reference = %order.reference, "[custody] Derived final secret");
        Ok(FinalSecret {
            secret: release.secret.clone(),
            commitment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::{InMemoryContentStore, InMemoryKVStore};
    use crate::chain::DocumentChain;
    use crate::ports::MockTimeSource;
    use crate::vault::IdentityVault;

    struct Fixture {
        vault: IdentityVault,
        chain: DocumentChain,
    }

    fn fixture() -> Fixture {
        let content = Arc::new(InMemoryContentStore::new());
        let kv = Arc::new(InMemoryKVStore::new());
        let time = Arc::new(MockTimeSource::new(1_700_000_000));
        Fixture {
            vault: IdentityVault::new(kv.clone(), content.clone(), time.clone()),
            chain: DocumentChain::new(content, kv, time),
        }
    }

    #[test]
    fn test_commitment_is_deterministic_per_order() {
        let f = fixture();
        let custodian = f.vault.create_secrets(&"C".into()).unwrap();
        let plugin = SafeguardSecretPlugin::new();

        let first = f.chain.create_order(None, "A".into());
        let second = f.chain.create_order(None, "A".into());

        let c1 = plugin.prepare_commitment(&first, &custodian).unwrap();
        assert_eq!(c1, plugin.prepare_commitment(&first, &custodian).unwrap());
        assert_ne!(c1, plugin.prepare_commitment(&second, &custodian).unwrap());
    }

    #[test]
    fn test_released_secret_derives_commitment() {
        let f = fixture();
        let custodian = f.vault.create_secrets(&"C".into()).unwrap();
        let plugin = SafeguardSecretPlugin::new();
        let order = f.chain.create_order(None, "A".into());

        let commitment = plugin.prepare_commitment(&order, &custodian).unwrap();
        let secret = plugin.release_secret(&order, &custodian).unwrap();
        assert_eq!(public_key_from_private_hex(&secret).unwrap(), commitment);
    }

    #[tokio::test]
    async fn test_final_secret_requires_beneficiary_keys() {
        let f = fixture();
        let plugin = SafeguardSecretPlugin::new();
        let custodian = f.vault.create_secrets(&"C".into()).unwrap();
        let beneficiary = f.vault.create_secrets(&"B".into()).unwrap();
        let outsider = f.vault.create_secrets(&"D".into()).unwrap();
        f.vault.publish_identity(&"B".into()).await.unwrap();
        let b_doc = f.vault.identity_document(&"B".into()).await.unwrap();

        let mut order = f.chain.create_order(Some("B".into()), "A".into());
        let commitment = plugin.prepare_commitment(&order, &custodian).unwrap();
        f.chain
            .append_commitment(&mut order, &"p1".into(), commitment.clone())
            .unwrap();
        let payload = plugin.produce_redemption_payload(&order, &b_doc).unwrap();
        f.chain
            .append_redemption_request(&mut order, &"p2".into(), "token".into(), payload)
            .unwrap();
        let secret = plugin.release_secret(&order, &custodian).unwrap();
        f.chain
            .append_secret_release(&mut order, &"p3".into(), secret.clone())
            .unwrap();

        let delivered = plugin.produce_final_secret(&order, &beneficiary).unwrap();
        assert_eq!(delivered.secret, secret);
        assert_eq!(delivered.commitment, commitment);

        assert!(matches!(
            plugin.produce_final_secret(&order, &outsider),
            Err(CustodyError::DecryptError(_))
        ));
    }
}
