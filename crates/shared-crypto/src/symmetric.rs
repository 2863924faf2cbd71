//! # Symmetric Encryption
//!
//! XChaCha20-Poly1305 for order payloads and wrapped content keys.
//!
//! The 192-bit nonce is drawn at random per message. Callers may bind a
//! ciphertext to context (sender, format version) as associated data; the
//! same bytes must be supplied to decrypt.

use crate::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroize;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// 256-bit content or wrapping key. Wiped on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, e.g. a key just unwrapped from a sealed box.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(self.0.as_slice().into())
    }
}

/// Per-message nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Wrap raw nonce bytes.
    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Encrypt under a fresh nonce. Returns (ciphertext, nonce).
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<(Vec<u8>, Nonce), CryptoError> {
    encrypt_bound(key, plaintext, &[])
}

/// Decrypt a ciphertext produced by [`encrypt`].
pub fn decrypt(key: &SecretKey, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, CryptoError> {
    decrypt_bound(key, ciphertext, nonce, &[])
}

/// Encrypt with `context` authenticated but not encrypted.
pub fn encrypt_bound(
    key: &SecretKey,
    plaintext: &[u8],
    context: &[u8],
) -> Result<(Vec<u8>, Nonce), CryptoError> {
    let nonce = Nonce::generate();
    let ciphertext = key
        .cipher()
        .encrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad: context,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok((ciphertext, nonce))
}

/// Decrypt a ciphertext produced by [`encrypt_bound`] with the same context.
pub fn decrypt_bound(
    key: &SecretKey,
    ciphertext: &[u8],
    nonce: &Nonce,
    context: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    key.cipher()
        .decrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: ciphertext,
                aad: context,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
