//! Delegation chain construction
//!
//! The long-term device key signs a single delegation to an ephemeral session
//! key. Lifetimes are clamped to the configured ceiling; a caller asking for
//! more simply gets the ceiling.

use anchor_core::effects::{KeyMaterial, PhysicalTimeEffects};
use anchor_core::{
    AnchorError, AnchorResult, Delegation, DelegationChain, DelegationConfig, Principal,
    SignedDelegation,
};
use std::collections::BTreeSet;

/// Builds single-hop delegation chains
#[derive(Debug, Clone)]
pub struct DelegationChainBuilder {
    config: DelegationConfig,
}

impl DelegationChainBuilder {
    /// Builder enforcing `config`
    pub fn new(config: DelegationConfig) -> Self {
        Self { config }
    }

    /// Lifetime actually granted for a requested `ttl_ms`.
    ///
    /// `None` selects the short session window used at login.
    pub fn effective_ttl(&self, ttl_ms: Option<u64>) -> u64 {
        ttl_ms
            .unwrap_or(self.config.session_ttl_ms)
            .min(self.config.max_ttl_ms)
    }

    /// Build a chain at the current time of `time`
    pub async fn build<T, S, K>(
        &self,
        time: &T,
        signer: &S,
        session_key: &K,
        ttl_ms: Option<u64>,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationChain>
    where
        T: PhysicalTimeEffects + ?Sized,
        S: KeyMaterial + ?Sized,
        K: KeyMaterial + ?Sized,
    {
        let now_ms = time.now_ms().await?;
        self.build_at(now_ms, signer, session_key, ttl_ms, targets)
            .await
    }

    /// Build a chain as of `now_ms`.
    ///
    /// Signing is the one place the long-term credential is used. A failed or
    /// cancelled signing ceremony is returned to the caller, never retried.
    pub async fn build_at<S, K>(
        &self,
        now_ms: u64,
        signer: &S,
        session_key: &K,
        ttl_ms: Option<u64>,
        targets: Option<BTreeSet<Principal>>,
    ) -> AnchorResult<DelegationChain>
    where
        S: KeyMaterial + ?Sized,
        K: KeyMaterial + ?Sized,
    {
        let ttl = self.effective_ttl(ttl_ms);
        let delegation = Delegation {
            public_key: session_key.public_key()?,
            expiration_ms: now_ms.saturating_add(ttl),
            targets,
        };

        let signature = signer
            .sign(&delegation.signing_payload())
            .await
            .map_err(AnchorError::from_signing_ceremony)?;

        // A lazily bound signer knows its key only after signing.
        let public_key = signer.public_key()?;

        tracing::debug!(
            expiration_ms = delegation.expiration_ms,
            ttl_ms = ttl,
            scoped = delegation.targets.is_some(),
            "built delegation chain"
        );

        Ok(DelegationChain {
            public_key,
            delegations: vec![SignedDelegation {
                delegation,
                signature,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_effects::{verify_delegation_chain, Ed25519KeyMaterial};
    use anchor_testkit::FailingKeyMaterial;
    use proptest::prelude::*;

    const MINUTE: u64 = 60_000;

    fn builder() -> DelegationChainBuilder {
        DelegationChainBuilder::new(DelegationConfig {
            session_ttl_ms: 10 * MINUTE,
            max_ttl_ms: 60 * MINUTE,
            default_app_ttl_ms: 30 * MINUTE,
        })
    }

    #[tokio::test]
    async fn test_default_ttl_is_session_window() {
        let signer = Ed25519KeyMaterial::from_seed(&[1; 32]);
        let session = Ed25519KeyMaterial::from_seed(&[2; 32]);
        let chain = builder()
            .build_at(1_000, &signer, &session, None, None)
            .await
            .unwrap();

        assert_eq!(chain.expiration_ms(), Some(1_000 + 10 * MINUTE));
        assert_eq!(chain.public_key, signer.der_public_key());
        assert_eq!(
            verify_delegation_chain(&chain, 2_000).unwrap(),
            session.der_public_key()
        );
    }

    #[tokio::test]
    async fn test_targets_are_signed() {
        let signer = Ed25519KeyMaterial::from_seed(&[1; 32]);
        let session = Ed25519KeyMaterial::from_seed(&[2; 32]);
        let app = Principal::from_bytes(vec![7]);
        let chain = builder()
            .build_at(0, &signer, &session, Some(MINUTE), Some([app.clone()].into()))
            .await
            .unwrap();
        assert!(chain.permits(&app));
        assert!(!chain.permits(&Principal::from_bytes(vec![8])));
        verify_delegation_chain(&chain, 1).unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_signing_propagates() {
        let session = Ed25519KeyMaterial::from_seed(&[2; 32]);
        let err = builder()
            .build_at(0, &FailingKeyMaterial::cancelled(), &session, None, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AnchorError::SigningFailed {
                message: "signing ceremony cancelled".to_string(),
                cancelled: true
            }
        );
    }

    proptest! {
        #[test]
        fn ttl_is_clamped_to_ceiling(ttl in 0u64..(10 * 60 * MINUTE), now in 0u64..1_000_000_000) {
            let b = builder();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let chain = rt.block_on(async {
                let signer = Ed25519KeyMaterial::from_seed(&[3; 32]);
                let session = Ed25519KeyMaterial::from_seed(&[4; 32]);
                b.build_at(now, &signer, &session, Some(ttl), None).await.unwrap()
            });
            let expected = (now + ttl).min(now + 60 * MINUTE);
            prop_assert_eq!(chain.expiration_ms(), Some(expected));
            if ttl < 60 * MINUTE {
                prop_assert_eq!(chain.expiration_ms(), Some(now + ttl));
            }
        }
    }
}
