//! Composite test effects
//!
//! One [`TestEffects`] stands for one physical device: its own authenticator
//! and randomness, talking to a registry and clock that every device in the
//! test shares.

use crate::authenticator::SoftwareAuthenticator;
use crate::clock::SimulatedClock;
use crate::fixtures::test_config;
use crate::random::SeededRandom;
use crate::registry::{InMemoryRegistry, RegistrySettings};
use anchor_core::effects::{
    Assertion, AuthenticatorEffects, CredentialCreation, CredentialRegistryEffects, NewCredential,
    PhysicalTimeEffects, RandomEffects,
};
use anchor_core::{
    AnchorConfig, AnchorNumber, AnchorResult, Challenge, ChallengeResult, CredentialId,
    DelegationCertificate, DelegationChain, DeviceData, Principal, ProofOfWork, PublicKey,
    RegisterResponse, RegistryPolicy, TentativeRegistration, VerifyTentativeResult,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Deterministic effects for one simulated device
#[derive(Clone)]
pub struct TestEffects {
    clock: SimulatedClock,
    random: SeededRandom,
    authenticator: SoftwareAuthenticator,
    registry: Arc<InMemoryRegistry>,
}

impl TestEffects {
    /// Device `seed` with a fresh registry configured by [`test_config`]
    #[allow(clippy::expect_used)]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, &test_config()).expect("test configuration is valid")
    }

    /// Device `seed` with a fresh registry configured from `config`
    pub fn with_config(seed: u64, config: &AnchorConfig) -> AnchorResult<Self> {
        let clock = SimulatedClock::default();
        let registry = InMemoryRegistry::new(RegistrySettings::from_config(config)?, clock.clone());
        Ok(Self {
            random: SeededRandom::new(seed),
            authenticator: SoftwareAuthenticator::with_seed(seed),
            registry: Arc::new(registry),
            clock,
        })
    }

    /// A second device sharing this one's registry and clock
    pub fn another_device(&self, seed: u64) -> Self {
        Self {
            clock: self.clock.clone(),
            random: SeededRandom::new(seed),
            authenticator: SoftwareAuthenticator::with_seed(seed),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Shared clock
    pub fn clock(&self) -> &SimulatedClock {
        &self.clock
    }

    /// This device's authenticator
    pub fn authenticator(&self) -> &SoftwareAuthenticator {
        &self.authenticator
    }

    /// Shared registry
    pub fn registry(&self) -> &InMemoryRegistry {
        &self.registry
    }
}

#[async_trait]
impl PhysicalTimeEffects for TestEffects {
    async fn now_ms(&self) -> AnchorResult<u64> {
        self.clock.now_ms().await
    }

    async fn sleep_ms(&self, ms: u64) -> AnchorResult<()> {
        self.clock.sleep_ms(ms).await
    }
}

#[async_trait]
impl RandomEffects for TestEffects {
    async fn random_bytes(&self, len: usize) -> Vec<u8> {
        self.random.random_bytes(len).await
    }

    async fn random_u64(&self) -> u64 {
        self.random.random_u64().await
    }
}

#[async_trait]
impl AuthenticatorEffects for TestEffects {
    async fn create_credential(&self, request: CredentialCreation) -> AnchorResult<NewCredential> {
        self.authenticator.create_credential(request).await
    }

    async fn get_assertion(
        &self,
        challenge: &[u8],
        allowed: &[CredentialId],
    ) -> AnchorResult<Assertion> {
        self.authenticator.get_assertion(challenge, allowed).await
    }
}

#[async_trait]
impl CredentialRegistryEffects for TestEffects {
    async fn policy(&self) -> AnchorResult<RegistryPolicy> {
        self.registry.policy().await
    }

    async fn lookup_devices(&self, anchor: AnchorNumber) -> AnchorResult<Vec<DeviceData>> {
        self.registry.lookup_devices(anchor).await
    }

    async fn add_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<()> {
        self.registry.add_device(auth, anchor, device).await
    }

    async fn remove_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        self.registry.remove_device(auth, anchor, public_key).await
    }

    async fn replace_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        device: DeviceData,
    ) -> AnchorResult<()> {
        self.registry
            .replace_device(auth, anchor, public_key, device)
            .await
    }

    async fn create_challenge(&self, pow: ProofOfWork) -> AnchorResult<Challenge> {
        self.registry.create_challenge(pow).await
    }

    async fn register(
        &self,
        device: DeviceData,
        challenge: ChallengeResult,
    ) -> AnchorResult<RegisterResponse> {
        self.registry.register(device, challenge).await
    }

    async fn request_delegation_certificate(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        session_public_key: &PublicKey,
        ttl_ms: u64,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationCertificate> {
        self.registry
            .request_delegation_certificate(auth, anchor, session_public_key, ttl_ms, targets)
            .await
    }

    async fn register_tentative_device(
        &self,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<TentativeRegistration> {
        self.registry.register_tentative_device(anchor, device).await
    }

    async fn verify_tentative_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        code: &str,
    ) -> AnchorResult<VerifyTentativeResult> {
        self.registry
            .verify_tentative_device(auth, anchor, public_key, code)
            .await
    }

    async fn cancel_tentative_device(
        &self,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        self.registry.cancel_tentative_device(anchor, public_key).await
    }
}
