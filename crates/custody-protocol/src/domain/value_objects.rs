//! # Domain Value Objects
//!
//! Immutable value types for the custody protocol.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{ContentId, OrderReference};

use super::entities::OrderDocument;

/// Order lifecycle state, reconstructed from the phases present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Built in memory, not yet published.
    #[default]
    Created,
    /// Phase 1 published.
    Deposited,
    /// Phase 2 present.
    CommitmentReceived,
    /// Phase 3 present.
    RedemptionRequested,
    /// Phase 4 present (terminal).
    SecretReleased,
}

impl OrderState {
    /// Derive the state of a published document.
    ///
    /// A document that has been through the content store is at least
    /// `Deposited`; `Created` only describes the in-memory draft.
    pub fn of(order: &OrderDocument) -> Self {
        if order.secret_release.is_some() {
            OrderState::SecretReleased
        } else if order.redemption_request.is_some() {
            OrderState::RedemptionRequested
        } else if order.commitment.is_some() {
            OrderState::CommitmentReceived
        } else {
            OrderState::Deposited
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::SecretReleased)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderState::Created => "Created",
            OrderState::Deposited => "Deposited",
            OrderState::CommitmentReceived => "CommitmentReceived",
            OrderState::RedemptionRequested => "RedemptionRequested",
            OrderState::SecretReleased => "SecretReleased",
        };
        f.write_str(name)
    }
}

/// Local index record: latest known revision of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIndexEntry {
    /// Order this entry tracks.
    pub reference: OrderReference,
    /// Latest revision published or fetched by this participant.
    pub content_id: ContentId,
    /// State of that revision.
    pub state: OrderState,
    /// When this participant first recorded the order.
    pub created_at: DateTime<Utc>,
    /// When the entry last changed.
    pub updated_at: DateTime<Utc>,
}

/// What a local phase-initiating call returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    /// Order the call acted on.
    pub order_reference: OrderReference,
    /// Revision the call published.
    pub order_cid: ContentId,
    /// State after the call.
    pub state: OrderState,
}

/// Slice of `total` items on zero-based `page` of size `per_page`.
///
/// `per_page == 0` selects everything; a page past the end is empty.
pub fn page_bounds(total: usize, page: usize, per_page: usize) -> Range<usize> {
    if per_page == 0 {
        return 0..total;
    }
    let start = page.saturating_mul(per_page).min(total);
    let end = page.saturating_add(1).saturating_mul(per_page).min(total);
    start..end
}
