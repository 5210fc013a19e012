//! Layer 1: Effect Trait Definitions
//!
//! Pure trait definitions for every side effect the identity layer performs.
//! This module defines **what** effects exist; handlers define **how**.
//!
//! # Effect Classification
//!
//! ## Infrastructure Effects (Layer 3: `anchor-effects`)
//! - **Time**: wall clock and cooperative sleep
//! - **Random**: entropy for nonces, session keys and recovery phrases
//! - **KeyMaterial**: "sign bytes, expose a public key", independent of algorithm
//!
//! ## External Collaborators (bound by the embedding application)
//! - **Authenticator**: the platform/roaming authenticator ceremony
//! - **CredentialRegistry**: the authoritative device list and registration gate
//!
//! ## Testing (Layer 8: `anchor-testkit`)
//! Deterministic handlers for every trait above.
//!
//! All effect-using code is parameterized by these traits so flows can be
//! driven in tests without a browser, an authenticator, or a network.

pub mod authenticator;
pub mod key_material;
pub mod random;
pub mod registry;
pub mod time;

pub use authenticator::{
    Assertion, AuthenticatorAttachment, AuthenticatorEffects, CredentialCreation, NewCredential,
};
pub use key_material::KeyMaterial;
pub use random::RandomEffects;
pub use registry::CredentialRegistryEffects;
pub use time::PhysicalTimeEffects;
