//! Authenticated sessions
//!
//! A session owns an ephemeral Ed25519 session key and the delegation that
//! authorizes it, signed by whichever device the user logged in with. The
//! session key is never persisted or registered; it dies with the session.
//! Delegations are immutable: renewing builds a new chain with a new key.
//! The session delegation is only valid against the credential registry;
//! applications get their own delegations through
//! [`Session::request_app_delegation`].

use crate::context::{IdentityContext, IdentityEffects};
use crate::delegation::DelegationChainBuilder;
use crate::recovery::{RecoveryDeriver, RecoveryPhrase};
use crate::resolver::MultiCredentialResolver;
use anchor_core::effects::KeyMaterial;
use anchor_core::{
    AnchorError, AnchorNumber, AnchorResult, DelegationCertificate, DelegationChain, DeviceData,
    DeviceSnapshot, KeyType, Principal, PublicKey,
};
use anchor_effects::Ed25519KeyMaterial;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Delegation usable until it expires
    Active,
    /// Logged out; the delegation must not be used again
    LoggedOut,
}

/// Logged-in anchor with its current session delegation
pub struct Session<E: IdentityEffects> {
    ctx: IdentityContext<E>,
    anchor: AnchorNumber,
    signer: Arc<dyn KeyMaterial>,
    session_key: Ed25519KeyMaterial,
    chain: DelegationChain,
    snapshot: DeviceSnapshot,
    state: SessionState,
}

impl<E: IdentityEffects + 'static> Session<E> {
    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Log in with any authentication device of `anchor`
    pub async fn login(ctx: &IdentityContext<E>, anchor: AnchorNumber) -> AnchorResult<Self> {
        let snapshot = lookup_snapshot(ctx, anchor).await?;
        let devices = snapshot.authentication_devices();
        Self::login_with_snapshot(ctx, snapshot, &devices).await
    }

    /// Log in with one of `devices`, e.g. a recovery security key
    pub async fn login_with_devices(
        ctx: &IdentityContext<E>,
        anchor: AnchorNumber,
        devices: &[DeviceData],
    ) -> AnchorResult<Self> {
        let snapshot = lookup_snapshot(ctx, anchor).await?;
        Self::login_with_snapshot(ctx, snapshot, devices).await
    }

    /// Log in with a recovery phrase.
    ///
    /// The phrase may carry its anchor number in front, as it is displayed at
    /// setup; if so it must name `anchor`. The derived key has to match a
    /// registered seed-phrase recovery device.
    pub async fn login_with_recovery_phrase(
        ctx: &IdentityContext<E>,
        anchor: AnchorNumber,
        phrase: &str,
    ) -> AnchorResult<Self> {
        let phrase = RecoveryPhrase::parse(phrase)?;
        if let Some(written) = phrase.anchor() {
            if written != anchor {
                return Err(AnchorError::invalid(format!(
                    "recovery phrase belongs to identity anchor {written}, not {anchor}"
                )));
            }
        }

        let snapshot = lookup_snapshot(ctx, anchor).await?;
        let key = RecoveryDeriver::from_config(&ctx.config().recovery).derive(phrase.mnemonic())?;
        let derived = key.der_public_key();

        let registered = snapshot
            .recovery_devices()
            .iter()
            .any(|d| d.key_type == KeyType::SeedPhrase && d.public_key == derived);
        if !registered {
            tracing::warn!(%anchor, "recovery phrase does not match any recovery device");
            return Err(AnchorError::authentication(
                "recovery phrase does not match the identity anchor",
            ));
        }

        Self::establish(ctx, snapshot, Arc::new(key)).await
    }

    async fn login_with_snapshot(
        ctx: &IdentityContext<E>,
        snapshot: DeviceSnapshot,
        devices: &[DeviceData],
    ) -> AnchorResult<Self> {
        let resolver =
            MultiCredentialResolver::new(ctx.effects_arc(), ctx.gate().clone(), devices)?;
        Self::establish(ctx, snapshot, Arc::new(resolver)).await
    }

    /// Mint the session delegation with `signer`
    pub async fn establish(
        ctx: &IdentityContext<E>,
        snapshot: DeviceSnapshot,
        signer: Arc<dyn KeyMaterial>,
    ) -> AnchorResult<Self> {
        let anchor = snapshot.anchor;
        let targets = registry_scope(ctx)?;
        let session_key = Ed25519KeyMaterial::generate(ctx.effects()).await;
        let chain = DelegationChainBuilder::new(ctx.config().delegation.clone())
            .build(ctx.effects(), signer.as_ref(), &session_key, None, Some(targets))
            .await?;

        tracing::info!(%anchor, device = %chain.public_key, "session established");

        Ok(Self {
            ctx: ctx.clone(),
            anchor,
            signer,
            session_key,
            chain,
            snapshot,
            state: SessionState::Active,
        })
    }

    // =========================================================================
    // DELEGATIONS
    // =========================================================================

    /// Current session delegation; refuses an expired or logged-out session
    pub async fn delegation(&self) -> AnchorResult<DelegationChain> {
        if self.state == SessionState::LoggedOut {
            return Err(AnchorError::SessionExpired);
        }
        let now_ms = self.ctx.effects().now_ms().await?;
        if self.chain.is_expired(now_ms) {
            tracing::debug!(anchor = %self.anchor, "session delegation expired");
            return Err(AnchorError::SessionExpired);
        }
        Ok(self.chain.clone())
    }

    /// Replace the session key and delegation; signs with the login device again
    pub async fn renew(&mut self) -> AnchorResult<()> {
        if self.state == SessionState::LoggedOut {
            return Err(AnchorError::SessionExpired);
        }
        let targets = registry_scope(&self.ctx)?;
        let session_key = Ed25519KeyMaterial::generate(self.ctx.effects()).await;
        let chain = self
            .builder()
            .build(self.ctx.effects(), self.signer.as_ref(), &session_key, None, Some(targets))
            .await?;
        self.session_key = session_key;
        self.chain = chain;
        tracing::info!(anchor = %self.anchor, "session delegation renewed");
        Ok(())
    }

    /// Ask the registry to delegate to an application session key.
    ///
    /// The lifetime defaults to the configured application window and is
    /// clamped to the ceiling.
    pub async fn request_app_delegation(
        &self,
        app_session_key: &PublicKey,
        ttl_ms: Option<u64>,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationCertificate> {
        let auth = self.delegation().await?;
        let requested = ttl_ms.unwrap_or(self.ctx.config().delegation.default_app_ttl_ms);
        let ttl = self.builder().effective_ttl(Some(requested));
        tracing::debug!(anchor = %self.anchor, requested, ttl, "requesting application delegation");
        self.ctx
            .effects()
            .request_delegation_certificate(&auth, self.anchor, app_session_key, ttl, targets)
            .await
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// End the session; the delegation is unusable afterwards
    pub fn logout(&mut self) {
        if self.state == SessionState::Active {
            tracing::info!(anchor = %self.anchor, "logged out");
        }
        self.state = SessionState::LoggedOut;
    }

    /// Re-read the anchor's devices from the registry
    pub async fn refresh_devices(&mut self) -> AnchorResult<&DeviceSnapshot> {
        self.snapshot = lookup_snapshot(&self.ctx, self.anchor).await?;
        Ok(&self.snapshot)
    }

    /// Logged-in anchor
    pub fn anchor(&self) -> AnchorNumber {
        self.anchor
    }

    /// Session lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has not been logged out
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Last known device list
    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    /// Public key of the device backing the session delegation
    pub fn device_public_key(&self) -> &PublicKey {
        &self.chain.public_key
    }

    /// Public key of the ephemeral session key
    pub fn session_public_key(&self) -> PublicKey {
        self.session_key.der_public_key()
    }

    /// Ephemeral session key
    pub fn session_key(&self) -> &Ed25519KeyMaterial {
        &self.session_key
    }

    /// Whether the anchor should be nudged to add a recovery mechanism
    pub fn needs_recovery_mechanism(&self) -> bool {
        self.snapshot.needs_recovery_mechanism()
    }

    /// Context the session was created with
    pub fn context(&self) -> &IdentityContext<E> {
        &self.ctx
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: DeviceSnapshot) {
        self.snapshot = snapshot;
    }

    fn builder(&self) -> DelegationChainBuilder {
        DelegationChainBuilder::new(self.ctx.config().delegation.clone())
    }
}

fn registry_scope<E: IdentityEffects>(ctx: &IdentityContext<E>) -> AnchorResult<BTreeSet<Principal>> {
    Ok(BTreeSet::from([ctx.config().registry.principal()?]))
}

pub(crate) async fn lookup_snapshot<E: IdentityEffects>(
    ctx: &IdentityContext<E>,
    anchor: AnchorNumber,
) -> AnchorResult<DeviceSnapshot> {
    let devices = ctx.effects().lookup_devices(anchor).await?;
    if devices.is_empty() {
        return Err(AnchorError::not_found(format!(
            "identity anchor {anchor} has no devices"
        )));
    }
    Ok(DeviceSnapshot::new(anchor, devices))
}
