//! Request and response shapes of the credential registry

use super::delegation::SignedDelegation;
use super::identifiers::AnchorNumber;
use serde::{Deserialize, Serialize};

/// Policy published by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPolicy {
    /// Leading zero bits required of a registration proof of work
    pub difficulty_bits: u32,
    /// Ceiling on any delegation lifetime
    pub max_delegation_ttl_ms: u64,
}

/// Solved proof-of-work puzzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfWork {
    /// Client timestamp the proof was computed for
    pub timestamp_ms: u64,
    /// Nonce satisfying the difficulty predicate
    pub nonce: u64,
}

/// CAPTCHA issued against a proof of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Encoded CAPTCHA image
    #[serde(with = "serde_bytes")]
    pub image: Vec<u8>,
    /// Single-use key identifying this CAPTCHA
    pub challenge_key: String,
}

/// User answer to a CAPTCHA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResult {
    /// Key of the answered CAPTCHA
    pub key: String,
    /// Characters entered by the user
    pub chars: String,
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterResponse {
    /// A new anchor was assigned
    Registered {
        /// The new anchor
        anchor: AnchorNumber,
    },
    /// The registry has no room left
    CanisterFull,
    /// CAPTCHA answer was wrong or the key was already used
    BadChallenge,
}

/// Delegation issued by the registry for an application session key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationCertificate {
    /// Anchor the certificate was issued for
    pub anchor: AnchorNumber,
    /// Registry-signed delegation to the application session key
    pub delegation: SignedDelegation,
}

/// Tentative device registration handed back to the new device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TentativeRegistration {
    /// Code the user reads off the new device and types on the confirming one
    pub verification_code: String,
    /// Server-side deadline for confirmation
    pub expiration_ms: u64,
}

/// Outcome of submitting a confirmation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyTentativeResult {
    /// The tentative device is now a registered device
    Verified,
    /// The code was wrong; `retries_left` further attempts remain
    WrongCode {
        /// Remaining attempts
        retries_left: u32,
    },
    /// No tentative device is pending: it expired or attempts ran out
    Expired,
}
