//! # Document Chain Module
//!
//! Sealed revisions, the local order index and the chain that ties them.

pub mod document_chain;
pub mod envelope;
pub mod index;

pub use document_chain::DocumentChain;
pub use envelope::{SignedEnvelope, WrappedKey, ENVELOPE_VERSION};
pub use index::OrderIndex;
