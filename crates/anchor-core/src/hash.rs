//! Pure synchronous hashing
//!
//! Hashing is deterministic and side-effect free, so it is not an effect.
//! Every proof-of-work message and delegation signing payload goes through
//! this module so there is a single place that names the algorithm.
//!
//! Current algorithm: **SHA-256** (32-byte output)

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes to a 32-byte digest
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut h = hasher();
    h.update(data);
    h.finalize()
}

/// Create an incremental hasher
pub fn hasher() -> Hasher {
    Hasher(Sha256::new())
}

/// Incremental SHA-256 hasher
#[derive(Debug, Clone)]
pub struct Hasher(Sha256);

impl Hasher {
    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Feed a length-prefixed field (u32 big endian length)
    pub fn update_field(&mut self, data: &[u8]) {
        self.0.update((data.len() as u32).to_be_bytes());
        self.0.update(data);
    }

    /// Consume the hasher and return the digest
    pub fn finalize(self) -> [u8; 32] {
        let mut output = [0u8; 32];
        output.copy_from_slice(&self.0.finalize());
        output
    }
}

/// Count leading zero bits of a digest
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in digest {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}
