//! # Order Plugins
//!
//! The policy seam of the state machine. The machine decides *when* a phase
//! runs and checks its preconditions; the plugin decides *what* the phase
//! contains.

pub mod safeguard;

pub use safeguard::SafeguardSecretPlugin;

use shared_types::{OrderRequest, OrderResponse, OrderSecretRequest};

use crate::domain::{CustodyError, IdentityDocument, OrderDocument};
use crate::vault::IdentitySecrets;

/// What the beneficiary ends up with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalSecret {
    /// Delivered private material (hex).
    pub secret: String,
    /// Public counterpart derived from `secret` (hex).
    pub commitment: String,
}

/// Order-kind specific behaviour, chosen once at startup.
pub trait CustodyPlugin: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Reject a deposit request before anything is built.
    fn validate_order_request(&self, _request: &OrderRequest) -> Result<(), CustodyError> {
        Ok(())
    }

    /// Reject a release request before anything is built.
    fn validate_order_secret_request(
        &self,
        _request: &OrderSecretRequest,
    ) -> Result<(), CustodyError> {
        Ok(())
    }

    /// Fill the phase-1 document from the request.
    fn prepare_deposit(
        &self,
        order: &mut OrderDocument,
        request: &OrderRequest,
    ) -> Result<(), CustodyError> {
        order.extension.extend(request.extension.clone());
        Ok(())
    }

    /// Custodian: the public commitment for phase 2.
    fn prepare_commitment(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError>;

    /// Principal: the response reported once phase 2 arrives.
    fn prepare_order_response(&self, order: &OrderDocument) -> Result<OrderResponse, CustodyError> {
        let commitment = order.commitment.as_ref().ok_or_else(|| {
            CustodyError::OutOfOrder(format!("order {} has no commitment", order.reference))
        })?;
        Ok(OrderResponse {
            order_reference: order.reference,
            commitment: commitment.commitment_public_key.clone(),
            created_at: order.created_at,
            extension: order.extension.clone(),
        })
    }

    /// Principal: the phase-3 payload sealed for the beneficiary.
    fn produce_redemption_payload(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentityDocument,
    ) -> Result<String, CustodyError>;

    /// Custodian: the private material released in phase 4.
    fn release_secret(
        &self,
        order: &OrderDocument,
        custodian: &IdentitySecrets,
    ) -> Result<String, CustodyError>;

    /// Beneficiary: the delivered secret and its public counterpart.
    fn produce_final_secret(
        &self,
        order: &OrderDocument,
        beneficiary: &IdentitySecrets,
    ) -> Result<FinalSecret, CustodyError>;
}
