//! # Error Types
//!
//! Errors raised while parsing identifiers and transaction payloads.

use thiserror::Error;

/// Errors from shared type conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The string is not a valid order reference.
    #[error("Invalid order reference: {0}")]
    InvalidReference(String),

    /// The string does not name a known processor.
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    /// The string does not name a known sort order.
    #[error("Unknown sort order: {0}")]
    UnknownSortOrder(String),

    /// A mandatory transaction tag is absent.
    #[error("Missing transaction tag: {0}")]
    MissingTag(&'static str),

    /// The payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Payload(String),
}
