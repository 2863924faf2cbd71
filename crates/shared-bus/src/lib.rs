//! # Shared Bus - In-Memory Ledger
//!
//! Carries `LedgerTransaction`s between custody participants.
//!
//! ## Delivery Rules
//!
//! - Every submitted transaction is appended to an ordered log and assigned
//!   a transaction id and a height.
//! - Each participant subscribes with its own id; a subscription only yields
//!   transactions that list it among `recipient_ids`.
//! - Delivery is at-most-once per subscription and in submission order.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Participant A│                    │ Participant C│
//! │              │    submit()        │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │    Ledger    │          │
//!                  │  (log + fan) │ ─────────┘
//!                  └──────────────┘  subscribe("C")
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{LedgerEntry, LedgerFilter, TransactionId};
pub use publisher::{InMemoryLedger, LedgerPublisher};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum entries to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
