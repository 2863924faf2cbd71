//! # State Machine Module

pub mod locks;
pub mod state_machine;

pub use locks::ReferenceLocks;
pub use state_machine::{OrderStateMachine, BENEFICIARY_DOCUMENT_KEY};
