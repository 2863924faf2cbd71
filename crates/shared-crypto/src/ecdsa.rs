//! # secp256k1 Commitment Keys
//!
//! Key pairs on the secp256k1 curve used as per-order commitments: the
//! custodian publishes the compressed public key at phase 2 and releases
//! the private key at phase 4. Anyone holding both can check that they
//! belong together.

use crate::CryptoError;
use k256::ecdsa::{SigningKey, VerifyingKey};

/// Length of a compressed public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Compressed secp256k1 public key (33 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secp256k1PublicKey([u8; PUBLIC_KEY_LEN]);

impl Secp256k1PublicKey {
    /// Create from compressed bytes (33 bytes, starting with 0x02 or 0x03).
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Get raw compressed bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Hex-encode the compressed point.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// secp256k1 keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Parse a hex-encoded 32-byte private key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(bytes)
    }

    /// Get public key (compressed, 33 bytes).
    pub fn public_key(&self) -> Secp256k1PublicKey {
        let sec1_bytes = self.signing_key.verifying_key().to_sec1_bytes();
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(&sec1_bytes[..PUBLIC_KEY_LEN]);
        Secp256k1PublicKey(bytes)
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Hex-encode the private key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Derive the hex public key from a hex private key.
pub fn public_key_from_private_hex(private_hex: &str) -> Result<String, CryptoError> {
    Ok(Secp256k1KeyPair::from_hex(private_hex)?.public_key().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_bytes() {
        let original = Secp256k1KeyPair::generate();
        let restored = Secp256k1KeyPair::from_bytes(original.to_bytes()).unwrap();
        assert_eq!(original.public_key(), restored.public_key());
    }

    #[test]
    fn test_public_from_private_hex_matches_keypair() {
        let keypair = Secp256k1KeyPair::from_bytes([0xABu8; 32]).unwrap();
        let derived = public_key_from_private_hex(&keypair.to_hex()).unwrap();
        assert_eq!(derived, keypair.public_key().to_hex());
        assert_eq!(derived.len(), PUBLIC_KEY_LEN * 2);
    }

    #[test]
    fn test_zero_key_rejected() {
        assert!(matches!(
            Secp256k1KeyPair::from_bytes([0u8; 32]),
            Err(CryptoError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_bad_hex_length_rejected() {
        assert!(matches!(
            Secp256k1KeyPair::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_public_key_validation() {
        let keypair = Secp256k1KeyPair::generate();
        assert!(Secp256k1PublicKey::from_bytes(*keypair.public_key().as_bytes()).is_ok());
        assert!(Secp256k1PublicKey::from_bytes([0u8; PUBLIC_KEY_LEN]).is_err());
    }
}
