//! # Shared Crypto - Custody Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `bls` | BLS12-381 (min_pk) | Revision signing, redemption tokens |
//! | `kem` | secp256k1 ECDH + BLAKE3 KDF | Addressing revisions to recipients |
//! | `ecdsa` | secp256k1 | Per-order commitment key pairs |
//! | `symmetric` | XChaCha20-Poly1305 | Payload encryption |
//! | `hashing` | BLAKE3 | Content ids, key derivation |
//!
//! ## Security Properties
//!
//! - **XChaCha20**: 192-bit nonce, random per message
//! - **BLS**: proof-of-possession ciphersuite, keys derived from a seed via `KeyGen`
//! - **KEM**: fresh ephemeral key per encapsulation, shared secret never reused
//! - **BLAKE3**: domain-separated derivation contexts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bls;
pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod kem;
pub mod symmetric;

// Re-exports
pub use bls::{BlsKeyPair, BlsPublicKey, BlsSignature};
pub use ecdsa::{public_key_from_private_hex, Secp256k1KeyPair, Secp256k1PublicKey};
pub use errors::CryptoError;
pub use hashing::{blake3_derive_key, blake3_hash, blake3_hash_many, Blake3Hasher};
pub use kem::{EncapsulationKeyPair, EncapsulationPublicKey, SealedBox};
pub use symmetric::{decrypt, decrypt_bound, encrypt, encrypt_bound, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
