//! # Request/Response Payloads
//!
//! JSON payloads carried inside ledger transactions and across the
//! synchronous call surface.
//!
//! ## Design Rules
//!
//! - Field names are camelCase on the wire.
//! - Every payload that a plugin may extend carries an `extension` map.
//! - Payloads reference revisions by content id; the transaction envelope
//!   carries the sender's identity.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entities::{ContentId, OrderReference, Timestamp};
use crate::errors::TypeError;

/// Free-form plugin data.
pub type Extension = BTreeMap<String, String>;

// =============================================================================
// PHASE 1: DEPOSIT
// =============================================================================

/// Open a new order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Identity document of the beneficiary, if already known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary_id_document_cid: Option<ContentId>,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

/// Principal → custodian: phase 1 was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillOrderRequest {
    /// The principal's identity document.
    pub document_cid: ContentId,
    /// The phase-1 revision.
    pub order_part1_cid: ContentId,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

// =============================================================================
// PHASE 2: COMMITMENT
// =============================================================================

/// Custodian → principal: phase 2 was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillOrderResponse {
    /// The phase-2 revision.
    pub order_part2_cid: ContentId,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

/// Outcome of a completed deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Reference of the new order.
    pub order_reference: OrderReference,
    /// Custodian's public commitment.
    pub commitment: String,
    /// Creation time of the order.
    pub created_at: Timestamp,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

// =============================================================================
// PHASE 3: REDEMPTION REQUEST
// =============================================================================

/// Ask the custodian to release the committed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSecretRequest {
    /// Order to redeem.
    pub order_reference: OrderReference,
    /// Overrides the beneficiary recorded at deposit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary_id_document_cid: Option<ContentId>,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

/// Principal → custodian: phase 3 was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillOrderSecretRequest {
    /// The requester's identity document.
    pub sender_document_cid: ContentId,
    /// The phase-3 revision.
    pub order_part3_cid: ContentId,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

// =============================================================================
// PHASE 4: SECRET RELEASE
// =============================================================================

/// Custodian → principal and beneficiary: phase 4 was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillOrderSecretResponse {
    /// The phase-4 revision.
    pub order_part4_cid: ContentId,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

/// The delivered secret and its public counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSecretResponse {
    /// Released private material (hex).
    pub secret: String,
    /// Public key derived from `secret` (hex).
    pub commitment: String,
    /// Order the secret belongs to.
    pub order_reference: OrderReference,
    /// Plugin data.
    #[serde(default)]
    pub extension: Extension,
}

// =============================================================================
// QUERIES
// =============================================================================

/// Look up a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderRequest {
    /// Order to look up.
    pub order_reference: OrderReference,
}

/// Latest known revision of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderResponse {
    /// Content id of the latest revision.
    pub order_cid: ContentId,
    /// JSON rendering of the decrypted order document.
    pub order: String,
}

/// Listing order over the local index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first.
    #[serde(rename = "dateCreatedAsc")]
    DateCreatedAsc,
    /// Newest first.
    #[default]
    #[serde(rename = "dateCreatedDesc")]
    DateCreatedDesc,
}

impl FromStr for SortOrder {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dateCreatedAsc" => Ok(SortOrder::DateCreatedAsc),
            "dateCreatedDesc" | "" => Ok(SortOrder::DateCreatedDesc),
            other => Err(TypeError::UnknownSortOrder(other.to_string())),
        }
    }
}

/// Page through the local index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListRequest {
    /// Zero-based page number.
    #[serde(default)]
    pub page: usize,
    /// Page size; `0` returns everything.
    #[serde(default)]
    pub per_page: usize,
    /// Sort order, newest first by default.
    #[serde(default)]
    pub sort_by: SortOrder,
}

/// One page of order references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    /// References on the requested page.
    pub order_references: Vec<OrderReference>,
}

/// Node status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Application name.
    pub application: String,
    /// Crate version.
    pub version: String,
    /// This node's participant id.
    pub node_id: String,
    /// The custodian this node deposits with.
    pub master_fiduciary_id: String,
    /// Number of orders in the local index.
    pub order_count: usize,
    /// RFC 3339 time of the snapshot.
    pub time_stamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_are_camel_case() {
        let req = FulfillOrderRequest {
            document_cid: "doc".into(),
            order_part1_cid: "p1".into(),
            extension: Extension::new(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"documentCid\""));
        assert!(json.contains("\"orderPart1Cid\""));
    }

    #[test]
    fn test_optional_beneficiary_omitted() {
        let json = serde_json::to_string(&OrderRequest::default()).unwrap();
        assert!(!json.contains("beneficiaryIdDocumentCid"));

        let parsed: OrderRequest = serde_json::from_str("{}").unwrap();
        assert!(parsed.beneficiary_id_document_cid.is_none());
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("dateCreatedAsc".parse::<SortOrder>().unwrap(), SortOrder::DateCreatedAsc);
        assert_eq!("".parse::<SortOrder>().unwrap(), SortOrder::DateCreatedDesc);
        assert!("byName".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_list_request_defaults() {
        let parsed: OrderListRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.page, 0);
        assert_eq!(parsed.per_page, 0);
        assert_eq!(parsed.sort_by, SortOrder::DateCreatedDesc);
    }
}
