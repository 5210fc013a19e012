//! Core data model shared by every layer.

pub mod delegation;
pub mod device;
pub mod identifiers;
pub mod registry;

pub use delegation::{Delegation, DelegationChain, SignedDelegation, DELEGATION_DOMAIN};
pub use device::{DeviceData, DeviceSnapshot, KeyType, Protection, Purpose, MAX_ALIAS_LEN};
pub use identifiers::{
    parse_anchor_number, AnchorNumber, CredentialId, Principal, PublicKey, Signature,
};
pub use registry::{
    Challenge, ChallengeResult, DelegationCertificate, ProofOfWork, RegisterResponse,
    RegistryPolicy, TentativeRegistration, VerifyTentativeResult,
};

/// Offset marking a derivation index as hardened
pub const HARDENED_OFFSET: u32 = 0x8000_0000;
