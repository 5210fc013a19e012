//! Anchor Testkit - Layer 8: Deterministic test handlers
//!
//! Effect handlers that make identity flows reproducible: a simulated clock,
//! seeded randomness, a software authenticator with scriptable user choices,
//! and an in-memory credential registry. [`TestEffects`] bundles them into
//! one device; [`TestEffects::another_device`] adds a second device against
//! the same registry for device-link scenarios.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod authenticator;
pub mod clock;
pub mod effects;
pub mod fixtures;
pub mod key_material;
pub mod random;
pub mod registry;

pub use authenticator::SoftwareAuthenticator;
pub use clock::SimulatedClock;
pub use effects::TestEffects;
pub use fixtures::{device_fixture, init_test_tracing, seed_anchor_with_devices, test_config};
pub use key_material::FailingKeyMaterial;
pub use random::SeededRandom;
pub use registry::{InMemoryRegistry, RegistryCalls, RegistrySettings, FIRST_ANCHOR};
