//! Registration proof-of-work predicate
//!
//! The puzzle binds a client timestamp and a nonce to the registry it is
//! meant for:
//!
//! ```text
//! len(domain) ‖ "ic-proof-of-work" ‖ timestamp_ms (u64 LE) ‖ nonce (u64 LE) ‖ len(registry) ‖ registry
//! ```
//!
//! A proof is valid when the SHA-256 of that message has at least
//! `difficulty_bits` leading zero bits and its timestamp lies within the
//! accepted skew of the verifier clock. Searching for a nonce lives in
//! `anchor-identity`; only the predicate is here so registries can check it.

use crate::errors::{AnchorError, AnchorResult};
use crate::hash;
use crate::types::ProofOfWork;

/// Domain separator of the proof-of-work message
pub const POW_DOMAIN: &[u8] = b"ic-proof-of-work";

/// Message hashed for `pow` against `registry_id`
pub fn message(pow: &ProofOfWork, registry_id: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(1 + POW_DOMAIN.len() + 16 + 1 + registry_id.len());
    msg.push(POW_DOMAIN.len() as u8);
    msg.extend_from_slice(POW_DOMAIN);
    msg.extend_from_slice(&pow.timestamp_ms.to_le_bytes());
    msg.extend_from_slice(&pow.nonce.to_le_bytes());
    msg.push(registry_id.len() as u8);
    msg.extend_from_slice(registry_id);
    msg
}

/// Whether `pow` meets the difficulty target, ignoring its timestamp
pub fn meets_difficulty(pow: &ProofOfWork, registry_id: &[u8], difficulty_bits: u32) -> bool {
    hash::leading_zero_bits(&hash::hash(&message(pow, registry_id))) >= difficulty_bits
}

/// Full verification: difficulty target and timestamp window
pub fn verify(
    pow: &ProofOfWork,
    registry_id: &[u8],
    difficulty_bits: u32,
    now_ms: u64,
    max_skew_ms: u64,
) -> AnchorResult<()> {
    if now_ms.abs_diff(pow.timestamp_ms) > max_skew_ms {
        return Err(AnchorError::validation(format!(
            "proof-of-work timestamp {} outside the accepted window around {now_ms}",
            pow.timestamp_ms
        )));
    }
    if !meets_difficulty(pow, registry_id, difficulty_bits) {
        return Err(AnchorError::validation(
            "proof-of-work does not meet the difficulty target",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_layout() {
        let pow = ProofOfWork {
            timestamp_ms: 1,
            nonce: 2,
        };
        let msg = message(&pow, &[0xaa, 0xbb]);
        assert_eq!(msg[0], 16);
        assert_eq!(&msg[1..17], POW_DOMAIN);
        assert_eq!(&msg[17..25], &1u64.to_le_bytes());
        assert_eq!(&msg[25..33], &2u64.to_le_bytes());
        assert_eq!(&msg[33..], &[2, 0xaa, 0xbb]);
    }

    #[test]
    fn test_zero_difficulty_always_holds() {
        let pow = ProofOfWork {
            timestamp_ms: 5,
            nonce: 99,
        };
        assert!(meets_difficulty(&pow, b"r", 0));
    }

    #[test]
    fn test_skew_window() {
        let pow = ProofOfWork {
            timestamp_ms: 10_000,
            nonce: 0,
        };
        assert!(verify(&pow, b"r", 0, 10_500, 1_000).is_ok());
        assert!(verify(&pow, b"r", 0, 9_500, 1_000).is_ok());
        assert!(verify(&pow, b"r", 0, 11_001, 1_000).is_err());
        assert!(verify(&pow, b"r", 0, 8_999, 1_000).is_err());
    }
}
