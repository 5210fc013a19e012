//! Explicit effect and configuration handle passed to every flow
//!
//! Flows never reach for a global registry connection; they receive an
//! [`IdentityContext`] at construction. Clones share the effects, the
//! configuration and the ceremony gate.

use anchor_core::effects::{
    AuthenticatorEffects, CredentialRegistryEffects, PhysicalTimeEffects, RandomEffects,
};
use anchor_core::{AnchorConfig, AnchorError, AnchorResult};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

/// Combined effects required by the identity flows.
pub trait IdentityEffects:
    PhysicalTimeEffects + RandomEffects + AuthenticatorEffects + CredentialRegistryEffects + Send + Sync
{
}

// Blanket implementation
impl<T> IdentityEffects for T where
    T: PhysicalTimeEffects
        + RandomEffects
        + AuthenticatorEffects
        + CredentialRegistryEffects
        + Send
        + Sync
{
}

/// Effects, configuration and ceremony gate for one authenticator
pub struct IdentityContext<E: IdentityEffects> {
    effects: Arc<E>,
    config: Arc<AnchorConfig>,
    gate: CeremonyGate,
}

impl<E: IdentityEffects> Clone for IdentityContext<E> {
    fn clone(&self) -> Self {
        Self {
            effects: Arc::clone(&self.effects),
            config: Arc::clone(&self.config),
            gate: self.gate.clone(),
        }
    }
}

impl<E: IdentityEffects> IdentityContext<E> {
    /// Create a context with a validated configuration
    pub fn new(effects: Arc<E>, config: AnchorConfig) -> AnchorResult<Self> {
        config.validate()?;
        Ok(Self {
            effects,
            config: Arc::new(config),
            gate: CeremonyGate::new(),
        })
    }

    /// Create a context after taking over the registry's published policy
    pub async fn with_registry_policy(effects: Arc<E>, mut config: AnchorConfig) -> AnchorResult<Self> {
        let policy = effects.policy().await?;
        config.apply_registry_policy(&policy);
        Self::new(effects, config)
    }

    /// Share an existing ceremony gate (same physical authenticator)
    pub fn with_gate(mut self, gate: CeremonyGate) -> Self {
        self.gate = gate;
        self
    }

    /// Effect handlers
    pub fn effects(&self) -> &E {
        &self.effects
    }

    /// Shared handle to the effect handlers
    pub fn effects_arc(&self) -> Arc<E> {
        Arc::clone(&self.effects)
    }

    /// Active configuration
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Ceremony gate for this authenticator
    pub fn gate(&self) -> &CeremonyGate {
        &self.gate
    }

    /// Raw registry principal mixed into proofs of work
    pub fn registry_id(&self) -> AnchorResult<Vec<u8>> {
        Ok(self.config.registry.principal()?.into_bytes())
    }
}

// =============================================================================
// CEREMONY GATE
// =============================================================================

/// Serializes authenticator ceremonies.
///
/// A second ceremony requested while one is in flight is rejected rather
/// than queued: a queued ceremony would prompt the user without a fresh action.
#[derive(Debug, Clone, Default)]
pub struct CeremonyGate {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of one ceremony
#[derive(Debug)]
pub struct CeremonyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl CeremonyGate {
    /// Create an idle gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the authenticator for one ceremony
    pub fn begin(&self, ceremony: &str) -> AnchorResult<CeremonyGuard> {
        match Arc::clone(&self.lock).try_lock_owned() {
            Ok(guard) => {
                tracing::debug!(ceremony, "authenticator ceremony started");
                Ok(CeremonyGuard { _guard: guard })
            }
            Err(_) => {
                tracing::warn!(ceremony, "rejected concurrent authenticator ceremony");
                Err(AnchorError::authentication("ceremony already in progress"))
            }
        }
    }

    /// Whether a ceremony is currently in flight
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cloneable cancellation signal for long-running flows
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Create an untriggered handle
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Fail with `UserCancelled` if cancellation was requested
    pub fn check(&self) -> AnchorResult<()> {
        if self.is_cancelled() {
            Err(AnchorError::UserCancelled)
        } else {
            Ok(())
        }
    }
}
