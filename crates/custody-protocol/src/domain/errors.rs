//! # Domain Errors
//!
//! Error types for the custody protocol.

use shared_crypto::CryptoError;
use shared_types::TypeError;
use thiserror::Error;

/// Custody protocol error types.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Unknown reference, content id or identity.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Secrets already exist for the participant.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Phase append before its predecessor, or over a different revision.
    #[error("Out of order: {0}")]
    OutOfOrder(String),

    /// Signature, chain link or commitment check failed.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// Payload not addressed to this identity, or undecryptable.
    #[error("Decrypt error: {0}")]
    DecryptError(String),

    /// Malformed or policy-rejected request.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Content store or ledger failure.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key material could not be derived or parsed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<TypeError> for CustodyError {
    fn from(err: TypeError) -> Self {
        CustodyError::ValidationError(err.to_string())
    }
}

impl From<KVStoreError> for CustodyError {
    fn from(err: KVStoreError) -> Self {
        CustodyError::TransportError(err.to_string())
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        CustodyError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CustodyError {
    fn from(err: bincode::Error) -> Self {
        CustodyError::Serialization(err.to_string())
    }
}

/// Errors from the local key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError {
        /// Backend message.
        message: String,
    },
    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError {
        /// Backend message.
        message: String,
    },
}
