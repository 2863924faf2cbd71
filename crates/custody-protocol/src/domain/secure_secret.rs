//! # Participant Seed
//!
//! The 32-byte random seed every key pair of a participant derives from.
//! Zeroized on drop and never printed.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Seed length in bytes.
pub const SEED_LEN: usize = 32;

/// A participant seed that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    inner: [u8; SEED_LEN],
}

impl Seed {
    /// Wrap existing seed bytes.
    pub fn new(bytes: [u8; SEED_LEN]) -> Self {
        Self { inner: bytes }
    }

    /// Draw a fresh seed from the thread RNG.
    pub fn generate() -> Self {
        let mut inner = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut inner);
        Self { inner }
    }

    /// Create from a slice (copies into fixed array).
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let inner: [u8; SEED_LEN] = slice.try_into().ok()?;
        Some(Self { inner })
    }

    /// Get the seed bytes.
    ///
    /// Avoid keeping references to the returned slice.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.inner
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Seed {}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_debug_hides_value() {
        let seed = Seed::new([0xABu8; SEED_LEN]);
        let debug_str = format!("{:?}", seed);
        assert!(!debug_str.to_lowercase().contains("ab"));
        assert!(debug_str.contains("***"));
    }

    #[test]
    fn test_seed_from_slice() {
        let bytes = [0xCDu8; SEED_LEN];
        assert_eq!(Seed::from_slice(&bytes).unwrap().as_bytes(), &bytes);
        assert!(Seed::from_slice(&bytes[..16]).is_none());
    }

    #[test]
    fn test_generated_seeds_differ() {
        assert_ne!(Seed::generate(), Seed::generate());
    }
}
