//! In-memory credential registry
//!
//! Enforces the registry side of every rule the identity layer depends on:
//! proof-of-work verification, single-use CAPTCHAs, capacity, delegation
//! authorization of mutations, device protection and tentative-device
//! confirmation with a bounded number of code attempts. Anchors are assigned
//! sequentially from [`FIRST_ANCHOR`].
//!
//! Time comes from the shared [`SimulatedClock`], so tentative devices expire
//! when a test advances the clock.

use crate::clock::SimulatedClock;
use anchor_core::effects::{CredentialRegistryEffects, KeyMaterial};
use anchor_core::{
    proof_of_work, AnchorConfig, AnchorError, AnchorNumber, AnchorResult, Challenge,
    ChallengeResult, Delegation, DelegationCertificate, DelegationChain, DeviceData, Principal,
    ProofOfWork, Protection, PublicKey, RegisterResponse, RegistryPolicy, SignedDelegation,
    TentativeRegistration, VerifyTentativeResult,
};
use anchor_effects::{verify_delegation_chain, Ed25519KeyMaterial};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// First anchor number handed out
pub const FIRST_ANCHOR: u64 = 10_000;

const REGISTRY_KEY_SEED: [u8; 32] = [0x52; 32];

// =============================================================================
// SETTINGS
// =============================================================================

/// Registry-side policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Raw registry principal mixed into proofs of work
    pub registry_id: Vec<u8>,
    /// Required leading zero bits
    pub difficulty_bits: u32,
    /// Accepted proof-of-work timestamp skew
    pub max_clock_skew_ms: u64,
    /// Ceiling on issued delegation lifetimes
    pub max_delegation_ttl_ms: u64,
    /// Anchors that may exist at once
    pub capacity: usize,
    /// Lifetime of a tentative device
    pub tentative_ttl_ms: u64,
    /// Code attempts per tentative device
    pub confirmation_attempts: u32,
}

impl RegistrySettings {
    /// Settings matching a client configuration
    pub fn from_config(config: &AnchorConfig) -> AnchorResult<Self> {
        Ok(Self {
            registry_id: config.registry.principal()?.into_bytes(),
            difficulty_bits: config.proof_of_work.difficulty_bits,
            max_clock_skew_ms: config.proof_of_work.max_clock_skew_ms,
            max_delegation_ttl_ms: config.delegation.max_ttl_ms,
            capacity: usize::MAX,
            tentative_ttl_ms: 15 * 60 * 1000,
            confirmation_attempts: config.device_link.confirmation_attempts,
        })
    }
}

/// Registry calls observed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCalls {
    /// Every call, reads included
    pub total: u64,
    /// Calls that may change registry state
    pub mutations: u64,
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone)]
struct Tentative {
    device: DeviceData,
    code: String,
    expiration_ms: u64,
    retries_left: u32,
}

#[derive(Default)]
struct RegistryState {
    anchors: BTreeMap<AnchorNumber, Vec<DeviceData>>,
    next_anchor: u64,
    challenges: HashMap<String, String>,
    issued_challenges: u64,
    tentative: HashMap<AnchorNumber, Tentative>,
    issued_codes: u64,
    calls: RegistryCalls,
}

/// Credential registry held in memory
pub struct InMemoryRegistry {
    settings: Mutex<RegistrySettings>,
    clock: SimulatedClock,
    signing_key: Ed25519KeyMaterial,
    offline: AtomicBool,
    dropped_lookups: AtomicU64,
    state: Mutex<RegistryState>,
    certificates: AtomicU64,
}

impl InMemoryRegistry {
    /// Empty registry reading time from `clock`
    pub fn new(settings: RegistrySettings, clock: SimulatedClock) -> Self {
        Self {
            settings: Mutex::new(settings),
            clock,
            signing_key: Ed25519KeyMaterial::from_seed(&REGISTRY_KEY_SEED),
            offline: AtomicBool::new(false),
            dropped_lookups: AtomicU64::new(0),
            state: Mutex::new(RegistryState {
                next_anchor: FIRST_ANCHOR,
                ..RegistryState::default()
            }),
            certificates: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // TEST CONTROLS
    // =========================================================================

    /// Create an anchor directly, bypassing registration
    pub fn seed_anchor(&self, devices: Vec<DeviceData>) -> AnchorNumber {
        let mut state = self.state.lock();
        let anchor = AnchorNumber(state.next_anchor);
        state.next_anchor += 1;
        state.anchors.insert(anchor, devices);
        anchor
    }

    /// Devices currently bound to `anchor`, without counting a call
    pub fn devices(&self, anchor: AnchorNumber) -> Vec<DeviceData> {
        self.state
            .lock()
            .anchors
            .get(&anchor)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of anchors
    pub fn anchor_count(&self) -> usize {
        self.state.lock().anchors.len()
    }

    /// Answer to the outstanding CAPTCHA `challenge_key`
    pub fn captcha_answer(&self, challenge_key: &str) -> Option<String> {
        self.state.lock().challenges.get(challenge_key).cloned()
    }

    /// Code of the tentative device pending for `anchor`
    pub fn tentative_code(&self, anchor: AnchorNumber) -> Option<String> {
        self.state
            .lock()
            .tentative
            .get(&anchor)
            .map(|t| t.code.clone())
    }

    /// Whether a tentative device is pending for `anchor`
    pub fn has_tentative(&self, anchor: AnchorNumber) -> bool {
        self.state.lock().tentative.contains_key(&anchor)
    }

    /// Limit the number of anchors
    pub fn set_capacity(&self, capacity: usize) {
        self.settings.lock().capacity = capacity;
    }

    /// Make every call fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` device lookups fail with a transport error
    pub fn drop_next_lookups(&self, count: u64) {
        self.dropped_lookups.store(count, Ordering::SeqCst);
    }

    /// Calls observed so far
    pub fn calls(&self) -> RegistryCalls {
        self.state.lock().calls
    }

    /// Certificates issued so far
    pub fn certificates_issued(&self) -> u64 {
        self.certificates.load(Ordering::SeqCst)
    }

    /// Key the registry signs delegation certificates with
    pub fn signing_public_key(&self) -> PublicKey {
        self.signing_key.der_public_key()
    }

    /// Current settings
    pub fn settings(&self) -> RegistrySettings {
        self.settings.lock().clone()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn enter(&self, mutation: bool) -> AnchorResult<()> {
        {
            let mut state = self.state.lock();
            state.calls.total += 1;
            if mutation {
                state.calls.mutations += 1;
            }
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(AnchorError::transport("credential registry unreachable"));
        }
        Ok(())
    }

    /// Check that `auth` is a live chain rooted at a device of `anchor`
    fn authorize(&self, auth: &DelegationChain, anchor: AnchorNumber) -> AnchorResult<()> {
        verify_delegation_chain(auth, self.clock.now())?;
        let registry = Principal::from_bytes(self.settings.lock().registry_id.clone());
        if !auth.permits(&registry) {
            return Err(AnchorError::permission_denied(
                "delegation is not scoped to the credential registry",
            ));
        }
        let state = self.state.lock();
        let devices = state
            .anchors
            .get(&anchor)
            .ok_or_else(|| AnchorError::not_found(format!("unknown identity anchor {anchor}")))?;
        if !devices.iter().any(|d| d.public_key == auth.public_key) {
            tracing::debug!(%anchor, root = %auth.public_key, "delegation root is not a device of the anchor");
            return Err(AnchorError::permission_denied(format!(
                "caller is not authorized for identity anchor {anchor}"
            )));
        }
        Ok(())
    }

    fn check_protection(device: &DeviceData, caller: &PublicKey) -> AnchorResult<()> {
        if device.protection == Protection::Protected && &device.public_key != caller {
            return Err(AnchorError::permission_denied(
                "protected device can only be changed by itself",
            ));
        }
        Ok(())
    }
}

fn digest_u64(parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[async_trait]
impl CredentialRegistryEffects for InMemoryRegistry {
    async fn policy(&self) -> AnchorResult<RegistryPolicy> {
        self.enter(false)?;
        let settings = self.settings.lock();
        Ok(RegistryPolicy {
            difficulty_bits: settings.difficulty_bits,
            max_delegation_ttl_ms: settings.max_delegation_ttl_ms,
        })
    }

    async fn lookup_devices(&self, anchor: AnchorNumber) -> AnchorResult<Vec<DeviceData>> {
        self.enter(false)?;
        let dropped = self
            .dropped_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(AnchorError::transport("device lookup dropped"));
        }
        Ok(self.devices(anchor))
    }

    async fn add_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<()> {
        self.enter(true)?;
        self.authorize(auth, anchor)?;
        device.validate()?;

        let mut state = self.state.lock();
        let devices = state.anchors.entry(anchor).or_default();
        if devices.iter().any(|d| d.public_key == device.public_key) {
            return Err(AnchorError::invalid("device is already registered"));
        }
        tracing::debug!(%anchor, alias = %device.alias, "registry added device");
        devices.push(device);
        Ok(())
    }

    async fn remove_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        self.enter(true)?;
        self.authorize(auth, anchor)?;

        let mut state = self.state.lock();
        let devices = state.anchors.entry(anchor).or_default();
        let index = devices
            .iter()
            .position(|d| &d.public_key == public_key)
            .ok_or_else(|| AnchorError::not_found(format!("no device with public key {public_key}")))?;
        Self::check_protection(&devices[index], &auth.public_key)?;
        devices.remove(index);
        tracing::debug!(%anchor, device = %public_key, "registry removed device");
        Ok(())
    }

    async fn replace_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        device: DeviceData,
    ) -> AnchorResult<()> {
        self.enter(true)?;
        self.authorize(auth, anchor)?;
        device.validate()?;

        let mut state = self.state.lock();
        let devices = state.anchors.entry(anchor).or_default();
        let index = devices
            .iter()
            .position(|d| &d.public_key == public_key)
            .ok_or_else(|| AnchorError::not_found(format!("no device with public key {public_key}")))?;
        Self::check_protection(&devices[index], &auth.public_key)?;
        devices[index] = device;
        tracing::debug!(%anchor, device = %public_key, "registry replaced device");
        Ok(())
    }

    async fn create_challenge(&self, pow: ProofOfWork) -> AnchorResult<Challenge> {
        self.enter(true)?;
        let settings = self.settings();
        proof_of_work::verify(
            &pow,
            &settings.registry_id,
            settings.difficulty_bits,
            self.clock.now(),
            settings.max_clock_skew_ms,
        )?;

        let mut state = self.state.lock();
        state.issued_challenges += 1;
        let challenge_key = format!("challenge-{}", state.issued_challenges);
        let answer = hex::encode(&Sha256::digest(challenge_key.as_bytes())[..3]);
        state.challenges.insert(challenge_key.clone(), answer);
        Ok(Challenge {
            image: format!("captcha image for {challenge_key}").into_bytes(),
            challenge_key,
        })
    }

    async fn register(
        &self,
        device: DeviceData,
        challenge: ChallengeResult,
    ) -> AnchorResult<RegisterResponse> {
        self.enter(true)?;
        device.validate()?;
        let capacity = self.settings.lock().capacity;

        let mut state = self.state.lock();
        // single use whatever the answer
        match state.challenges.remove(&challenge.key) {
            Some(answer) if answer == challenge.chars.trim() => {}
            _ => return Ok(RegisterResponse::BadChallenge),
        }
        if state.anchors.len() >= capacity {
            return Ok(RegisterResponse::CanisterFull);
        }
        let anchor = AnchorNumber(state.next_anchor);
        state.next_anchor += 1;
        state.anchors.insert(anchor, vec![device]);
        tracing::debug!(%anchor, "registry created anchor");
        Ok(RegisterResponse::Registered { anchor })
    }

    async fn request_delegation_certificate(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        session_public_key: &PublicKey,
        ttl_ms: u64,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationCertificate> {
        self.enter(false)?;
        self.authorize(auth, anchor)?;

        let ttl_ms = ttl_ms.min(self.settings.lock().max_delegation_ttl_ms);
        let delegation = Delegation {
            public_key: session_public_key.clone(),
            expiration_ms: self.clock.now().saturating_add(ttl_ms),
            targets,
        };
        let signature = self.signing_key.sign(&delegation.signing_payload()).await?;
        self.certificates.fetch_add(1, Ordering::SeqCst);
        Ok(DelegationCertificate {
            anchor,
            delegation: SignedDelegation {
                delegation,
                signature,
            },
        })
    }

    async fn register_tentative_device(
        &self,
        anchor: AnchorNumber,
        device: DeviceData,
    ) -> AnchorResult<TentativeRegistration> {
        self.enter(true)?;
        device.validate()?;
        let settings = self.settings();
        let now_ms = self.clock.now();

        let mut state = self.state.lock();
        let devices = state
            .anchors
            .get(&anchor)
            .ok_or_else(|| AnchorError::not_found(format!("unknown identity anchor {anchor}")))?;
        if devices.iter().any(|d| d.public_key == device.public_key) {
            return Err(AnchorError::invalid("device is already registered"));
        }

        state.issued_codes += 1;
        let n = digest_u64(&[
            device.public_key.as_bytes(),
            &state.issued_codes.to_be_bytes(),
        ]);
        let code = format!("{:06}", n % 1_000_000);
        let expiration_ms = now_ms.saturating_add(settings.tentative_ttl_ms);
        state.tentative.insert(
            anchor,
            Tentative {
                device,
                code: code.clone(),
                expiration_ms,
                retries_left: settings.confirmation_attempts,
            },
        );
        tracing::debug!(%anchor, expiration_ms, "registry parked tentative device");
        Ok(TentativeRegistration {
            verification_code: code,
            expiration_ms,
        })
    }

    async fn verify_tentative_device(
        &self,
        auth: &DelegationChain,
        anchor: AnchorNumber,
        public_key: &PublicKey,
        code: &str,
    ) -> AnchorResult<VerifyTentativeResult> {
        self.enter(true)?;
        self.authorize(auth, anchor)?;
        let now_ms = self.clock.now();

        let mut state = self.state.lock();
        let Some(mut pending) = state.tentative.remove(&anchor) else {
            return Ok(VerifyTentativeResult::Expired);
        };
        if &pending.device.public_key != public_key || now_ms >= pending.expiration_ms {
            if now_ms < pending.expiration_ms {
                state.tentative.insert(anchor, pending);
            }
            return Ok(VerifyTentativeResult::Expired);
        }

        if pending.code == code.trim() {
            state.anchors.entry(anchor).or_default().push(pending.device);
            tracing::debug!(%anchor, device = %public_key, "registry confirmed tentative device");
            return Ok(VerifyTentativeResult::Verified);
        }

        pending.retries_left = pending.retries_left.saturating_sub(1);
        let retries_left = pending.retries_left;
        if retries_left > 0 {
            state.tentative.insert(anchor, pending);
        }
        Ok(VerifyTentativeResult::WrongCode { retries_left })
    }

    async fn cancel_tentative_device(
        &self,
        anchor: AnchorNumber,
        public_key: &PublicKey,
    ) -> AnchorResult<()> {
        self.enter(true)?;
        let mut state = self.state.lock();
        if state
            .tentative
            .get(&anchor)
            .is_some_and(|t| &t.device.public_key == public_key)
        {
            state.tentative.remove(&anchor);
            tracing::debug!(%anchor, device = %public_key, "registry dropped tentative device");
        }
        Ok(())
    }
}
