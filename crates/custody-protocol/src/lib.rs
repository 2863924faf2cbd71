//! # Custody Protocol
//!
//! Four-phase custody of a secret between a principal, a custodian (the
//! "master fiduciary") and a beneficiary.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A principal deposits an order with a custodian, which publishes a public
//! commitment. Later the principal asks for release; the custodian publishes
//! the private half and the beneficiary checks it against the commitment.
//!
//! | Phase | Published by | Content |
//! |-------|--------------|---------|
//! | 1 | principal | deposit |
//! | 2 | custodian | commitment public key |
//! | 3 | principal | redemption token, payload sealed to beneficiary |
//! | 4 | custodian | released secret |
//!
//! Each revision is encrypted for its recipients, signed, stored in a
//! content-addressed store and linked to its predecessor by content id.
//! Participants signal each other with ledger transactions.
//!
//! ## Module Structure
//!
//! ```text
//! custody-protocol/
//! ├── domain/     # OrderDocument, IdentityDocument, invariants, errors
//! ├── ports/      # CustodyApi, ContentStore, KeyValueStore, Ledger, TimeSource
//! ├── adapters/   # In-memory stores, bus ledger, system clock
//! ├── chain/      # SignedEnvelope, OrderIndex, DocumentChain
//! ├── machine/    # OrderStateMachine, per-reference locks
//! ├── plugin/     # CustodyPlugin, SafeguardSecretPlugin
//! ├── vault.rs    # IdentityVault
//! ├── gateway.rs  # LedgerGateway
//! └── service.rs  # CustodyService
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod chain;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod machine;
pub mod plugin;
pub mod ports;
pub mod service;
pub mod vault;

// Re-exports
pub use adapters::{BusLedger, InMemoryContentStore, InMemoryKVStore, SystemTimeSource};
pub use chain::{DocumentChain, OrderIndex, SignedEnvelope};
pub use config::CustodyConfig;
pub use domain::{
    CustodyError, IdentityDocument, KVStoreError, OrderDocument, OrderIndexEntry, OrderKind,
    OrderReceipt, OrderState,
};
pub use gateway::LedgerGateway;
pub use machine::OrderStateMachine;
pub use plugin::{CustodyPlugin, FinalSecret, SafeguardSecretPlugin};
pub use ports::{
    ContentStore, CustodyApi, KeyValueStore, Ledger, MockTimeSource, RecordingLedger, TimeSource,
};
pub use service::{CustodyDependencies, CustodyService};
pub use vault::{IdentitySecrets, IdentityVault};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
