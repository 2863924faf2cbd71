//! Crypto error types.

use thiserror::Error;

/// Failures from key handling, signing and sealing.
///
/// Messages never include key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD authentication or decapsulation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key bytes of the wrong size
    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Signature does not verify under the given key
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Public key bytes are not a valid point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Secret key bytes are zero or out of range
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Signature bytes do not decode
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// Deriving a key from seed material failed
    #[error("key derivation failed: {0}")]
    KeyGenerationFailed(String),

    /// Malformed input (hex, lengths, framing)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_length_message() {
        let err = CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 31,
        };
        assert_eq!(err.to_string(), "key must be 32 bytes, got 31");
    }
}
