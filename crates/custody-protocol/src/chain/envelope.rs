//! # Signed Envelope
//!
//! Stored form of an order revision.
//!
//! The JSON order is encrypted once under a random content key with
//! XChaCha20-Poly1305, bound to the envelope version and sender so a
//! ciphertext cannot be re-wrapped under another sender's header. The
//! content key is sealed separately to each recipient's encapsulation key. The sender signs a BLAKE3 digest of every
//! header field and the ciphertext with its BLS key.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{
    decrypt_bound, encrypt_bound, BlsKeyPair, BlsPublicKey, BlsSignature, Blake3Hasher,
    EncapsulationKeyPair, EncapsulationPublicKey, Nonce, SealedBox, SecretKey,
};
use shared_types::ParticipantId;

use crate::domain::CustodyError;

/// Current envelope format.
pub const ENVELOPE_VERSION: u8 = 1;

/// The content key sealed to one recipient.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub recipient_id: ParticipantId,
    #[serde_as(as = "Bytes")]
    pub encapsulation: [u8; 33],
    #[serde_as(as = "Bytes")]
    pub nonce: [u8; 24],
    pub wrapped_key: Vec<u8>,
}

/// An encrypted, signed revision.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub version: u8,
    pub sender_id: ParticipantId,
    pub recipients: Vec<WrappedKey>,
    #[serde_as(as = "Bytes")]
    pub nonce: [u8; 24],
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "Bytes")]
    pub signature: [u8; 96],
}

impl SignedEnvelope {
    /// Encrypt `plaintext` for `recipients` and sign it as `sender_id`.
    pub fn seal(
        sender_id: &ParticipantId,
        signing: &BlsKeyPair,
        recipients: &[(ParticipantId, EncapsulationPublicKey)],
        plaintext: &[u8],
    ) -> Result<Self, CustodyError> {
        if recipients.is_empty() {
            return Err(CustodyError::ValidationError(
                "envelope needs at least one recipient".into(),
            ));
        }

        let content_key = SecretKey::generate();
        let (ciphertext, nonce) = encrypt_bound(
            &content_key,
            plaintext,
            &payload_context(ENVELOPE_VERSION, sender_id),
        )?;

        let recipients = recipients
            .iter()
            .map(|(id, key)| {
                let sealed = key.seal(content_key.as_bytes())?;
                Ok(WrappedKey {
                    recipient_id: id.clone(),
                    encapsulation: sealed.encapsulation,
                    nonce: sealed.nonce,
                    wrapped_key: sealed.ciphertext,
                })
            })
            .collect::<Result<Vec<_>, CustodyError>>()?;

        let mut envelope = Self {
            version: ENVELOPE_VERSION,
            sender_id: sender_id.clone(),
            recipients,
            nonce: *nonce.as_bytes(),
            ciphertext,
            signature: [0u8; 96],
        };
        envelope.signature = signing.sign(&envelope.signing_digest()).to_bytes();
        Ok(envelope)
    }

    /// Check the sender's signature over header and ciphertext.
    pub fn verify(&self, sender_key: &BlsPublicKey) -> Result<(), CustodyError> {
        let signature = BlsSignature::from_bytes(&self.signature).map_err(|_| {
            CustodyError::IntegrityError(format!("malformed signature from {}", self.sender_id))
        })?;
        sender_key
            .verify_strict(&self.signing_digest(), &signature)
            .map_err(|_| {
                CustodyError::IntegrityError(format!(
                    "envelope signature does not match {}",
                    self.sender_id
                ))
            })
    }

    /// Decrypt as `reader`. `DecryptError` if `reader` is not a recipient.
    pub fn open(
        &self,
        reader: &ParticipantId,
        keys: &EncapsulationKeyPair,
    ) -> Result<Vec<u8>, CustodyError> {
        let wrapped = self
            .recipients
            .iter()
            .find(|w| &w.recipient_id == reader)
            .ok_or_else(|| {
                CustodyError::DecryptError(format!("{} is not a recipient", reader))
            })?;

        let content_key = keys
            .open(&SealedBox {
                encapsulation: wrapped.encapsulation,
                nonce: wrapped.nonce,
                ciphertext: wrapped.wrapped_key.clone(),
            })
            .map_err(|e| CustodyError::DecryptError(e.to_string()))?;
        let content_key = SecretKey::from_slice(&content_key)
            .map_err(|_| CustodyError::DecryptError("wrapped key has wrong length".into()))?;

        decrypt_bound(
            &content_key,
            &self.ciphertext,
            &Nonce::from_bytes(self.nonce),
            &payload_context(self.version, &self.sender_id),
        )
        .map_err(|e| CustodyError::DecryptError(e.to_string()))
    }

    pub fn is_recipient(&self, participant: &ParticipantId) -> bool {
        self.recipients.iter().any(|w| &w.recipient_id == participant)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CustodyError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CustodyError> {
        let envelope: Self = bincode::deserialize(bytes)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(CustodyError::ValidationError(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }

    fn signing_digest(&self) -> [u8; 32] {
        let mut hasher = Blake3Hasher::new();
        hasher
            .update_field(&[self.version])
            .update_field(self.sender_id.as_str().as_bytes());
        for wrapped in &self.recipients {
            hasher
                .update_field(wrapped.recipient_id.as_str().as_bytes())
                .update_field(&wrapped.encapsulation)
                .update_field(&wrapped.nonce)
                .update_field(&wrapped.wrapped_key);
        }
        hasher.update_field(&self.nonce).update_field(&self.ciphertext);
        hasher.finalize()
    }
}

/// Associated data binding the payload to its header.
fn payload_context(version: u8, sender_id: &ParticipantId) -> Vec<u8> {
    let mut context = Vec::with_capacity(1 + sender_id.as_str().len());
    context.push(version);
    context.extend_from_slice(sender_id.as_str().as_bytes());
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Party {
        id: ParticipantId,
        signing: BlsKeyPair,
        keys: EncapsulationKeyPair,
    }

    fn party(id: &str, fill: u8) -> Party {
        Party {
            id: id.into(),
            signing: BlsKeyPair::derive(&[fill; 32]).unwrap(),
            keys: EncapsulationKeyPair::from_bytes(&[fill; 32]).unwrap(),
        }
    }

    fn seal_for(sender: &Party, recipients: &[&Party], plaintext: &[u8]) -> SignedEnvelope {
        let recipients: Vec<_> = recipients
            .iter()
            .map(|p| (p.id.clone(), p.keys.public_key()))
            .collect();
        SignedEnvelope::seal(&sender.id, &sender.signing, &recipients, plaintext).unwrap()
    }

    #[test]
    fn test_every_recipient_can_open() {
        let (a, c) = (party("A", 1), party("C", 3));
        let envelope = seal_for(&a, &[&a, &c], b"order json");

        envelope.verify(&a.signing.public_key()).unwrap();
        assert_eq!(envelope.open(&a.id, &a.keys).unwrap(), b"order json");
        assert_eq!(envelope.open(&c.id, &c.keys).unwrap(), b"order json");
    }

    #[test]
    fn test_non_recipient_gets_decrypt_error() {
        let (a, b, c) = (party("A", 1), party("B", 2), party("C", 3));
        let envelope = seal_for(&a, &[&a, &c], b"order json");

        assert!(!envelope.is_recipient(&b.id));
        assert!(matches!(
            envelope.open(&b.id, &b.keys),
            Err(CustodyError::DecryptError(_))
        ));
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let (a, c) = (party("A", 1), party("C", 3));
        let mut envelope = seal_for(&a, &[&a, &c], b"order json");
        envelope.ciphertext[0] ^= 1;

        assert!(matches!(
            envelope.verify(&a.signing.public_key()),
            Err(CustodyError::IntegrityError(_))
        ));
        assert!(envelope.verify(&c.signing.public_key()).is_err());
    }

    #[test]
    fn test_rewritten_sender_cannot_open() {
        let (a, c) = (party("A", 1), party("C", 3));
        let mut envelope = seal_for(&a, &[&c], b"order json");
        envelope.sender_id = "M".into();

        assert!(matches!(
            envelope.open(&c.id, &c.keys),
            Err(CustodyError::DecryptError(_))
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let a = party("A", 1);
        let envelope = seal_for(&a, &[&a], b"{}");
        let decoded = SignedEnvelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        decoded.verify(&a.signing.public_key()).unwrap();
    }
}
