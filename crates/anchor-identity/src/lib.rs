//! Anchor Identity - Layer 5: Client-side identity flows
//!
//! Lets one pseudonymous anchor authenticate through any of its registered
//! credentials and turn that authentication into short-lived delegations.
//!
//! # Components
//!
//! - [`resolver`]: one authenticator ceremony over every known credential,
//!   binding to whichever device answered
//! - [`delegation`]: time- and scope-bounded delegation chains with a TTL ceiling
//! - [`session`]: login variants and the session delegation lifecycle
//! - [`devices`]: add/remove/replace rules enforced before the registry is called
//! - [`pow`] and [`registration`]: proof-of-work + CAPTCHA gate for new anchors
//! - [`device_link`]: attaching a new device from an already-authenticated one
//! - [`recovery`]: deterministic keys from a recovery phrase
//!
//! Every flow receives an explicit [`IdentityContext`] carrying its effects
//! and configuration. Flow state machines are plain `transition` functions
//! returning the next state plus the effects to perform; the async drivers
//! only execute those effects.

#![forbid(unsafe_code)]

pub mod context;
pub mod delegation;
pub mod device_link;
pub mod devices;
pub mod flow;
pub mod pow;
pub mod recovery;
pub mod registration;
pub mod resolver;
pub mod session;

pub use context::{CancelHandle, CeremonyGate, CeremonyGuard, IdentityContext, IdentityEffects};
pub use delegation::DelegationChainBuilder;
pub use device_link::{LinkConfirmation, LinkOrigin, LinkPayload, LinkState};
pub use devices::{lookup_authentication_devices, lookup_recovery_devices, DeviceManager};
pub use flow::Transition;
pub use recovery::{RecoveryDeriver, RecoveryPhrase, RecoverySetup};
pub use registration::{RegistrationFlow, RegistrationOutcome, RegistrationState};
pub use resolver::{MultiCredentialResolver, ResolvedCredential, ResolverState};
pub use session::{Session, SessionState};
