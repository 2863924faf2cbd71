//! # Domain Invariants
//!
//! Business rules every fetched or appended revision must satisfy.

use shared_types::{ContentId, OrderReference, ParticipantId};

use super::entities::OrderDocument;
use super::errors::CustodyError;
use super::value_objects::OrderState;

/// Invariant: phases are strictly ordered.
///
/// A later phase revision may exist only if every earlier one does.
pub fn invariant_phase_order(order: &OrderDocument) -> Result<(), CustodyError> {
    if order.secret_release.is_some() && order.redemption_request.is_none() {
        return Err(CustodyError::OutOfOrder(
            "secret release without redemption request".into(),
        ));
    }
    if order.redemption_request.is_some() && order.commitment.is_none() {
        return Err(CustodyError::OutOfOrder(
            "redemption request without commitment".into(),
        ));
    }
    Ok(())
}

/// Invariant: the fetched document is in exactly the expected state.
pub fn invariant_state(order: &OrderDocument, expected: OrderState) -> Result<(), CustodyError> {
    let actual = order.state();
    if actual != expected {
        return Err(CustodyError::OutOfOrder(format!(
            "order {} is {}, expected {}",
            order.reference, actual, expected
        )));
    }
    Ok(())
}

/// Invariant: the newest revision links to the revision we know.
pub fn invariant_chain_link(
    order: &OrderDocument,
    expected_previous: &ContentId,
) -> Result<(), CustodyError> {
    match order.previous_cid() {
        Some(previous) if previous == expected_previous => Ok(()),
        Some(previous) => Err(CustodyError::IntegrityError(format!(
            "order {} links to {}, expected {}",
            order.reference, previous, expected_previous
        ))),
        None => Err(CustodyError::IntegrityError(format!(
            "order {} has no previous revision",
            order.reference
        ))),
    }
}

/// Invariant: a revision belongs to the order named by the transaction.
pub fn invariant_same_order(
    order: &OrderDocument,
    reference: &OrderReference,
) -> Result<(), CustodyError> {
    if &order.reference != reference {
        return Err(CustodyError::IntegrityError(format!(
            "revision carries reference {}, transaction tagged {}",
            order.reference, reference
        )));
    }
    Ok(())
}

/// Invariant: only the principal drives phases 1 and 3.
pub fn invariant_principal(
    order: &OrderDocument,
    sender: &ParticipantId,
) -> Result<(), CustodyError> {
    if &order.principal_id != sender {
        return Err(CustodyError::IntegrityError(format!(
            "{} is not the principal of order {}",
            sender, order.reference
        )));
    }
    Ok(())
}

/// Invariant: `next` is `prior` plus exactly one phase revision.
pub fn invariant_revision_extends(
    prior: &OrderDocument,
    next: &OrderDocument,
) -> Result<(), CustodyError> {
    let rewritten = || {
        CustodyError::IntegrityError(format!(
            "revision of order {} rewrites earlier phases",
            next.reference
        ))
    };
    let mut expected = next.predecessor().ok_or_else(rewritten)?;
    // The beneficiary may be replaced when phase 3 is appended.
    if next.state() == OrderState::RedemptionRequested {
        expected.beneficiary_id = prior.beneficiary_id.clone();
    }
    if &expected == prior {
        Ok(())
    } else {
        Err(rewritten())
    }
}

/// Invariant: the released secret derives the committed public key.
pub fn invariant_commitment_matches(committed: &str, derived: &str) -> Result<(), CustodyError> {
    if !committed.eq_ignore_ascii_case(derived) {
        return Err(CustodyError::IntegrityError(format!(
            "commitment mismatch: committed {}, released secret derives {}",
            committed, derived
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Commitment, OrderKind, RedemptionRequest};
    use shared_types::Extension;

    fn order() -> OrderDocument {
        OrderDocument {
            reference: OrderReference::generate(),
            kind: OrderKind::SafeguardSecret,
            principal_id: "A".into(),
            beneficiary_id: Some("B".into()),
            created_at: 1_000,
            commitment: None,
            redemption_request: None,
            secret_release: None,
            extension: Extension::new(),
        }
    }

    fn commitment(prev: &str) -> Commitment {
        Commitment {
            commitment_public_key: "pub123".into(),
            previous_cid: prev.into(),
            timestamp: 1_001,
        }
    }

    fn redemption(prev: &str) -> RedemptionRequest {
        RedemptionRequest {
            redemption_token: "sig".into(),
            beneficiary_encrypted_data: "box".into(),
            previous_cid: prev.into(),
            timestamp: 1_002,
        }
    }

    #[test]
    fn test_phase_order_rejects_gap() {
        let mut doc = order();
        doc.redemption_request = Some(redemption("p2"));
        assert!(matches!(
            invariant_phase_order(&doc),
            Err(CustodyError::OutOfOrder(_))
        ));
    }

    #[test]
    fn test_chain_link() {
        let mut doc = order();
        doc.commitment = Some(commitment("p1"));
        assert!(invariant_chain_link(&doc, &"p1".into()).is_ok());
        assert!(matches!(
            invariant_chain_link(&doc, &"other".into()),
            Err(CustodyError::IntegrityError(_))
        ));
    }

    #[test]
    fn test_revision_extends_allows_beneficiary_override_at_phase_three() {
        let mut prior = order();
        prior.commitment = Some(commitment("p1"));

        let mut next = prior.clone();
        next.beneficiary_id = Some("D".into());
        next.redemption_request = Some(redemption("p2"));
        assert!(invariant_revision_extends(&prior, &next).is_ok());
    }

    #[test]
    fn test_revision_extends_rejects_rewritten_commitment() {
        let mut prior = order();
        prior.commitment = Some(commitment("p1"));

        let mut next = prior.clone();
        next.commitment = Some(Commitment {
            commitment_public_key: "forged".into(),
            ..commitment("p1")
        });
        next.redemption_request = Some(redemption("p2"));
        assert!(matches!(
            invariant_revision_extends(&prior, &next),
            Err(CustodyError::IntegrityError(_))
        ));
    }

    #[test]
    fn test_commitment_match_is_case_insensitive() {
        assert!(invariant_commitment_matches("02ABcd", "02abCD").is_ok());
        assert!(invariant_commitment_matches("02ab", "03ab").is_err());
    }

    #[test]
    fn test_principal_check() {
        let doc = order();
        assert!(invariant_principal(&doc, &"A".into()).is_ok());
        assert!(invariant_principal(&doc, &"C".into()).is_err());
    }
}
