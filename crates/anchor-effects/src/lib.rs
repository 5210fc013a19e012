//! Anchor Effects - Layer 3: Production Effect Handlers
//!
//! Stateless implementations of the infrastructure effect traits defined in
//! `anchor-core` (Layer 1), plus the Ed25519 key material used for session
//! keys and recovery-phrase devices and the encoding of authenticator
//! assertions used as delegation signatures.
//!
//! **Layer Constraint**: no mock handlers here. Deterministic handlers belong
//! in `anchor-testkit` (Layer 8).

#![forbid(unsafe_code)]

pub mod assertion;
pub mod crypto;
pub mod random;
pub mod time;

pub use assertion::{
    assertion_signing_input, client_data_json, encode_assertion, verify_assertion,
    verify_device_signature,
};
pub use crypto::{
    der_decode_ed25519, der_encode_ed25519, verify_delegation_chain, verify_ed25519,
    Ed25519KeyMaterial, ED25519_DER_PREFIX,
};
pub use random::RealRandomHandler;
pub use time::RealTimeHandler;
