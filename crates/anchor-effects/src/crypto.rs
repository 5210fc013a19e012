//! Ed25519 key material and delegation verification
//!
//! Session keys and recovery-phrase devices are plain Ed25519 keys. Their
//! public keys travel DER-encoded (SubjectPublicKeyInfo, 44 bytes) so they can
//! sit next to authenticator keys in the same device list.

use crate::assertion::verify_device_signature;
use anchor_core::effects::{KeyMaterial, RandomEffects};
use anchor_core::{AnchorError, AnchorResult, DelegationChain, PublicKey, Signature};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;
use zeroize::Zeroize;

/// SubjectPublicKeyInfo prefix of an Ed25519 public key
pub const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// DER-encode a raw Ed25519 public key
pub fn der_encode_ed25519(raw: &[u8; 32]) -> PublicKey {
    let mut der = Vec::with_capacity(ED25519_DER_PREFIX.len() + raw.len());
    der.extend_from_slice(&ED25519_DER_PREFIX);
    der.extend_from_slice(raw);
    PublicKey::from_bytes(der)
}

/// Parse a DER-encoded Ed25519 public key
pub fn der_decode_ed25519(key: &PublicKey) -> AnchorResult<VerifyingKey> {
    let raw = key
        .as_bytes()
        .strip_prefix(&ED25519_DER_PREFIX[..])
        .ok_or_else(|| AnchorError::crypto("not a DER-encoded Ed25519 public key"))?;
    let raw: [u8; 32] = raw
        .try_into()
        .map_err(|_| AnchorError::crypto("Ed25519 public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| AnchorError::crypto(format!("Invalid Ed25519 public key: {e}")))
}

/// Verify an Ed25519 signature against a DER-encoded public key
pub fn verify_ed25519(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> AnchorResult<()> {
    let verifying_key = der_decode_ed25519(public_key)?;
    let sig: [u8; 64] = signature
        .as_bytes()
        .try_into()
        .map_err(|_| AnchorError::crypto("Ed25519 signature must be 64 bytes"))?;
    verifying_key
        .verify_strict(message, &ed25519_dalek::Signature::from_bytes(&sig))
        .map_err(|_| AnchorError::crypto("signature verification failed"))
}

/// Verify a delegation chain at `now_ms`.
///
/// Every hop must be signed by the key it descends from and still be valid.
/// The root hop may be an authenticator assertion; later hops are signed by
/// session keys. Returns the key holding the authority at the end of the chain.
pub fn verify_delegation_chain(chain: &DelegationChain, now_ms: u64) -> AnchorResult<PublicKey> {
    if chain.delegations.is_empty() {
        return Err(AnchorError::invalid("delegation chain has no delegations"));
    }
    if chain.is_expired(now_ms) {
        return Err(AnchorError::SessionExpired);
    }

    let mut signer = chain.public_key.clone();
    for (depth, hop) in chain.delegations.iter().enumerate() {
        let payload = hop.delegation.signing_payload();
        if depth == 0 {
            verify_device_signature(&signer, &payload, &hop.signature)?;
        } else {
            verify_ed25519(&signer, &payload, &hop.signature)?;
        }
        signer = hop.delegation.public_key.clone();
    }
    tracing::trace!(hops = chain.delegations.len(), "delegation chain verified");
    Ok(signer)
}

/// In-memory Ed25519 key
pub struct Ed25519KeyMaterial {
    signing_key: SigningKey,
}

impl Ed25519KeyMaterial {
    /// Key from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Fresh key from injected randomness
    pub async fn generate<R: RandomEffects + ?Sized>(random: &R) -> Self {
        let mut seed = random.random_bytes_32().await;
        let key = Self::from_seed(&seed);
        seed.zeroize();
        key
    }

    /// DER-encoded public key
    pub fn der_public_key(&self) -> PublicKey {
        der_encode_ed25519(&self.signing_key.verifying_key().to_bytes())
    }
}

impl fmt::Debug for Ed25519KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyMaterial")
            .field("public_key", &self.der_public_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyMaterial for Ed25519KeyMaterial {
    fn public_key(&self) -> AnchorResult<PublicKey> {
        Ok(self.der_public_key())
    }

    async fn sign(&self, message: &[u8]) -> AnchorResult<Signature> {
        Ok(Signature::from_bytes(
            self.signing_key.sign(message).to_bytes().to_vec(),
        ))
    }
}
