//! Credential registry client surface.
//!
//! - **Category**: External Collaborator
//! - **Implementation**: bound by the embedding application; `anchor-testkit`
//!   ships an in-memory registry
//!
//! The registry owns the authoritative device list of every anchor. The
//! identity layer reads snapshots and submits mutations; mutations are
//! authorized by the caller's current delegation chain. Unreachability is
//! reported as `AnchorError::Transport`.

use crate::errors::AnchorResult;
use crate::types::{
    AnchorNumber, Challenge, ChallengeResult, DelegationCertificate, DelegationChain, DeviceData,
    Principal, ProofOfWork, PublicKey, RegisterResponse, RegistryPolicy, TentativeRegistration,
    VerifyTentativeResult,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Calls against the remote credential registry
#[async_trait]
pub trait CredentialRegistryEffects: Send + Sync {
    /// Current registry policy
    async fn policy(&self) -> AnchorResult<RegistryPolicy>;

    /// Devices currently bound to `anchor`
    async fn lookup_devices(&self, anchor: AnchorNumber) -> AnchorResult<Vec<DeviceData>>;

    /// Bind a new device
    async fn add_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<()>;

    /// Unbind the device with `public_key`
    async fn remove_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()>;

    /// Atomically swap the device with `public_key` for `device`
    async fn replace_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        device: DeviceData,
    ) -> AnchorResult<()>;

    /// Exchange a solved proof of work for a CAPTCHA
    async fn create_challenge(&self, pow: ProofOfWork) -> AnchorResult<Challenge>;

    /// Create an anchor whose first device is `device`
    async fn register(
        &self,
        device: DeviceData,
        challenge: ChallengeResult,
    ) -> AnchorResult<RegisterResponse>;

    /// Issue a delegation for an application session key
    async fn request_delegation_certificate(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        session_public_key: &PublicKey,
        ttl_ms: u64,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationCertificate>;

    /// Park an unconfirmed device until an authenticated device confirms it
    async fn register_tentative_device(
        &self,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<TentativeRegistration>;

    /// Confirm the tentative device `public_key` with the code shown on it
    async fn verify_tentative_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        code: &str,
    ) -> AnchorResult<VerifyTentativeResult>;

    /// Drop a pending tentative device
    async fn cancel_tentative_device(
        &self,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()>;
}

#[async_trait]
impl<T: CredentialRegistryEffects + ?Sized> CredentialRegistryEffects for Arc<T> {
    async fn policy(&self) -> AnchorResult<RegistryPolicy> {
        (**self).policy().await
    }

    async fn lookup_devices(&self, anchor: AnchorNumber) -> AnchorResult<Vec<DeviceData>> {
        (**self).lookup_devices(anchor).await
    }

    async fn add_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<()> {
        (**self).add_device(auth, anchor, device).await
    }

    async fn remove_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        (**self).remove_device(auth, anchor, public_key).await
    }

    async fn replace_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        device: DeviceData,
    ) -> AnchorResult<()> {
        (**self)
            .replace_device(auth, anchor, public_key, device)
            .await
    }

    async fn create_challenge(&self, pow: ProofOfWork) -> AnchorResult<Challenge> {
        (**self).create_challenge(pow).await
    }

    async fn register(
        &self,
        device: DeviceData,
        challenge: ChallengeResult,
    ) -> AnchorResult<RegisterResponse> {
        (**self).register(device, challenge).await
    }

    async fn request_delegation_certificate(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        session_public_key: &PublicKey,
        ttl_ms: u64,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationCertificate> {
        (**self)
            .request_delegation_certificate(auth, anchor, session_public_key, ttl_ms, targets)
            .await
    }

    async fn register_tentative_device(
        &self,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<TentativeRegistration> {
        (**self).register_tentative_device(anchor, device).await
    }

    async fn verify_tentative_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        code: &str,
    ) -> AnchorResult<VerifyTentativeResult> {
        (**self)
            .verify_tentative_device(auth, anchor, public_key, code)
            .await
    }

    async fn cancel_tentative_device(
        &self,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        (**self).cancel_tentative_device(anchor, public_key).await
    }
}
