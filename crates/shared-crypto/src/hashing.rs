//! # BLAKE3 Hashing
//!
//! Content addressing, signing digests and key derivation.

use blake3::Hasher;

/// BLAKE3 hash output (256-bit).
pub type Hash = [u8; 32];

/// Stateful BLAKE3 hasher.
pub struct Blake3Hasher {
    inner: Hasher,
}

impl Blake3Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Hasher::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Update with a length-prefixed field so adjacent fields cannot alias.
    pub fn update_field(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(&(data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash data with BLAKE3 (one-shot).
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hash multiple length-prefixed inputs.
pub fn blake3_hash_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Blake3Hasher::new();
    for input in inputs {
        hasher.update_field(input);
    }
    hasher.finalize()
}

/// Derive key from context and input key material.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(blake3_hash(b"test"), blake3_hash(b"test"));
        assert_ne!(blake3_hash(b"input1"), blake3_hash(b"input2"));
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut hasher = Blake3Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), blake3_hash(b"hello world"));
    }

    #[test]
    fn test_hash_many_is_boundary_sensitive() {
        let a = blake3_hash_many(&[b"ab", b"c"]);
        let b = blake3_hash_many(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_key_separates_contexts() {
        let k1 = blake3_derive_key("custody signing", b"seed");
        let k2 = blake3_derive_key("custody encapsulation", b"seed");
        assert_ne!(k1, k2);
        assert_eq!(k1, blake3_derive_key("custody signing", b"seed"));
    }
}
