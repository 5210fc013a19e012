//! Anchor Core - Layer 1: Types, Effects, Configuration
//!
//! This crate provides the foundational types and effect interfaces for the
//! anchor identity layer. It contains no effect implementations; production
//! handlers live in `anchor-effects` and deterministic test handlers in
//! `anchor-testkit`.
//!
//! # Contents
//!
//! - Identifiers: anchor numbers, public keys, credential ids, principals
//! - Device model: device descriptors and registry snapshots
//! - Delegations: single-hop delegation chains from a device key to a session key
//! - Registry wire types: proof-of-work, CAPTCHA challenges, tentative devices
//! - Effect traits: time, randomness, key material, authenticator, credential registry
//! - Unified error type with the user-facing failure taxonomy
//! - Configuration with TOML loading and environment overrides

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Layered configuration
pub mod config;

/// Pure hashing for proofs and signing payloads
pub mod hash;

/// Registration proof-of-work predicate
pub mod proof_of_work;

/// Identifiers, device model, delegations, and registry wire types
pub mod types;

/// Effect interfaces (no implementations)
pub mod effects;

pub use config::{
    AnchorConfig, DelegationConfig, DeviceLinkConfig, ProofOfWorkConfig, RecoveryConfig,
    RegistrationConfig, RegistryConfig,
};
pub use errors::{AnchorError, AnchorResult, ErrorKind, FailureReport};
pub use types::*;
