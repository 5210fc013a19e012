//! Multi-credential resolution
//!
//! An anchor may own several authenticator credentials. Rather than asking
//! the user which device they hold, every known credential is offered in a
//! single ceremony and the resolver binds to whichever one the authenticator
//! used. Until that first ceremony the resolver does not know its own public
//! key, and says so instead of guessing.

use crate::context::CeremonyGate;
use anchor_core::effects::{Assertion, AuthenticatorEffects, KeyMaterial};
use anchor_core::{AnchorError, AnchorResult, CredentialId, DeviceData, PublicKey, Signature};
use anchor_effects::encode_assertion;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// A device descriptor the resolver can bind to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    /// Declared public key of the device
    pub public_key: PublicKey,
    /// Credential the authenticator presented
    pub credential_id: CredentialId,
}

/// Binding state of a resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    /// No ceremony has completed yet
    Unresolved,
    /// Bound to the device that answered the first ceremony
    Resolved(ResolvedCredential),
}

/// Key material backed by whichever of several credentials answers first
pub struct MultiCredentialResolver<A: AuthenticatorEffects + ?Sized> {
    authenticator: Arc<A>,
    gate: CeremonyGate,
    candidates: Vec<ResolvedCredential>,
    state: Mutex<ResolverState>,
}

impl<A: AuthenticatorEffects + ?Sized> MultiCredentialResolver<A> {
    /// Build a resolver over `devices`.
    ///
    /// Devices without a credential reference (recovery phrases) cannot take
    /// part in a ceremony and are skipped.
    pub fn new(authenticator: Arc<A>, gate: CeremonyGate, devices: &[DeviceData]) -> AnchorResult<Self> {
        let candidates: Vec<_> = devices
            .iter()
            .filter_map(|d| {
                d.credential_id.as_ref().map(|c| ResolvedCredential {
                    public_key: d.public_key.clone(),
                    credential_id: c.clone(),
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(AnchorError::invalid(
                "no device with an authenticator credential to log in with",
            ));
        }

        Ok(Self {
            authenticator,
            gate,
            candidates,
            state: Mutex::new(ResolverState::Unresolved),
        })
    }

    /// Current binding
    pub fn state(&self) -> ResolverState {
        self.state.lock().clone()
    }

    /// Number of credentials offered in an unresolved ceremony
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Run one ceremony over `challenge` and bind to the answering device
    pub async fn resolve(&self, challenge: &[u8]) -> AnchorResult<ResolvedCredential> {
        let (_, resolved) = self.assert(challenge).await?;
        Ok(resolved)
    }

    async fn assert(&self, challenge: &[u8]) -> AnchorResult<(Assertion, ResolvedCredential)> {
        let allowed: Vec<CredentialId> = match &*self.state.lock() {
            ResolverState::Resolved(bound) => vec![bound.credential_id.clone()],
            ResolverState::Unresolved => self
                .candidates
                .iter()
                .map(|c| c.credential_id.clone())
                .collect(),
        };

        let assertion = {
            let _ceremony = self.gate.begin("assertion")?;
            self.authenticator.get_assertion(challenge, &allowed).await?
        };

        let matched = self
            .candidates
            .iter()
            .find(|c| allowed.contains(&c.credential_id) && c.credential_id == assertion.credential_id)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(
                    credential_id = %assertion.credential_id,
                    "authenticator answered with an unknown credential"
                );
                AnchorError::NoMatchingCredential
            })?;

        let mut state = self.state.lock();
        if *state == ResolverState::Unresolved {
            tracing::info!(public_key = %matched.public_key, "resolved login credential");
            *state = ResolverState::Resolved(matched.clone());
        }
        Ok((assertion, matched))
    }
}

#[async_trait]
impl<A: AuthenticatorEffects + ?Sized> KeyMaterial for MultiCredentialResolver<A> {
    fn public_key(&self) -> AnchorResult<PublicKey> {
        match &*self.state.lock() {
            ResolverState::Resolved(bound) => Ok(bound.public_key.clone()),
            ResolverState::Unresolved => Err(AnchorError::NotYetResolved),
        }
    }

    async fn sign(&self, message: &[u8]) -> AnchorResult<Signature> {
        let (assertion, _) = self.assert(message).await?;
        encode_assertion(&assertion)
    }
}
