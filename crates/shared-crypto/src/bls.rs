//! BLS12-381 Signature Implementation
//!
//! Provides BLS signature primitives for:
//! - Deterministic key derivation from a participant seed
//! - Signing order envelopes and redemption tokens
//! - Verifying a revision against its publisher's identity document

use blst::min_pk::{PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;

use crate::CryptoError;

/// Domain separation tag for BLS signatures (Ethereum 2.0 compatible)
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Length of a compressed public key.
pub const PUBLIC_KEY_LEN: usize = 48;

/// Length of a compressed signature.
pub const SIGNATURE_LEN: usize = 96;

/// BLS public key (48 bytes compressed)
#[derive(Clone, Debug)]
pub struct BlsPublicKey(PublicKey);

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

/// BLS signature (96 bytes)
#[derive(Clone, Debug)]
pub struct BlsSignature(Signature);

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

/// BLS key pair for signing operations
pub struct BlsKeyPair {
    secret: SecretKey,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        Self::derive(&ikm)
    }

    /// Derive a key pair from input key material (at least 32 bytes).
    ///
    /// The same material always yields the same key pair.
    pub fn derive(ikm: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(ikm, &[])
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("{:?}", e)))?;
        let public = BlsPublicKey(secret.sk_to_pk());
        Ok(Self { secret, public })
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST, &[]))
    }

    /// Get the public key
    pub fn public_key(&self) -> BlsPublicKey {
        self.public.clone()
    }
}

impl BlsPublicKey {
    /// Verify a signature against this public key
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        signature.0.verify(true, message, DST, &[], &self.0, true) == BLST_ERROR::BLST_SUCCESS
    }

    /// Check a signature, failing with `SignatureVerificationFailed`.
    pub fn verify_strict(&self, message: &[u8], signature: &BlsSignature) -> Result<(), CryptoError> {
        if self.verify(message, signature) {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerificationFailed)
        }
    }

    /// Create from 48-byte compressed representation
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<Self, CryptoError> {
        PublicKey::from_bytes(bytes)
            .map(BlsPublicKey)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Serialize to 48-byte compressed form
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }
}

impl BlsSignature {
    /// Create from 96-byte representation
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Result<Self, CryptoError> {
        Signature::from_bytes(bytes)
            .map(BlsSignature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; SIGNATURE_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SIGNATURE_LEN,
                    actual: bytes.len(),
                })?;
        Self::from_bytes(&bytes)
    }

    /// Serialize to 96-byte form
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Hex-encode the compressed signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bls_sign_verify_roundtrip() {
        let keypair = BlsKeyPair::generate().unwrap();
        let message = b"test message";
        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature));
    }

    #[test]
    fn test_bls_invalid_signature_rejected() {
        let keypair = BlsKeyPair::generate().unwrap();
        let signature = keypair.sign(b"test message");
        assert!(!keypair.public_key().verify(b"wrong message", &signature));
        assert!(matches!(
            keypair.public_key().verify_strict(b"wrong message", &signature),
            Err(CryptoError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_bls_different_key_rejected() {
        let keypair1 = BlsKeyPair::generate().unwrap();
        let keypair2 = BlsKeyPair::generate().unwrap();
        let message = b"test message";
        let signature = keypair1.sign(message);
        assert!(!keypair2.public_key().verify(message, &signature));
    }

    #[test]
    fn test_bls_derive_is_deterministic() {
        let seed = [7u8; 32];
        let a = BlsKeyPair::derive(&seed).unwrap();
        let b = BlsKeyPair::derive(&seed).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
    }

    #[test]
    fn test_bls_derive_rejects_short_material() {
        assert!(BlsKeyPair::derive(&[1u8; 16]).is_err());
    }

    #[test]
    fn test_bls_serialization_roundtrip() {
        let keypair = BlsKeyPair::generate().unwrap();
        let message = b"test message";
        let signature = keypair.sign(message);

        let pk_restored = BlsPublicKey::from_bytes(&keypair.public_key().to_bytes()).unwrap();
        assert_eq!(keypair.public_key(), pk_restored);

        let sig_restored = BlsSignature::from_hex(&signature.to_hex()).unwrap();
        assert_eq!(signature, sig_restored);

        assert!(pk_restored.verify(message, &sig_restored));
    }
}
