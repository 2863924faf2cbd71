//! # Adapters
//!
//! In-process implementations of the outbound ports.

pub mod content_store;
pub mod kv_store;
pub mod ledger;
pub mod time;

pub use content_store::InMemoryContentStore;
pub use kv_store::InMemoryKVStore;
pub use ledger::BusLedger;
pub use time::SystemTimeSource;
