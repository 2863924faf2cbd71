//! # Domain Module
//!
//! Core domain types for the custody protocol.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod secure_secret;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use secure_secret::{Seed, SEED_LEN};
pub use value_objects::*;
