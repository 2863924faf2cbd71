//! # Shared Types Crate
//!
//! Identifiers, the `LedgerTransaction` envelope and the JSON request/response
//! payloads exchanged between custody participants.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a participant
//!   boundary is defined here.
//! - **Envelope Authority**: the transaction's `sender_id` identifies the
//!   sender; payloads carry content ids, not identities.
//! - **Reference Tagging**: every transaction carries the order reference in
//!   its `reference` tag so receivers can demultiplex without a lookup table.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ipc;

pub use entities::*;
pub use envelope::{LedgerTransaction, Processor, TAG_REFERENCE};
pub use errors::*;
pub use ipc::*;
