//! Delegations from a device key to an ephemeral session key
//!
//! A chain is rooted at the public key of a registered device. Each hop
//! authorizes the next key until its expiration, optionally restricted to a
//! set of target principals. Chains built by this crate have exactly one hop.

use super::identifiers::{Principal, PublicKey, Signature};
use crate::hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Domain separator prefixed to every delegation signing payload
pub const DELEGATION_DOMAIN: &[u8] = b"anchor-request-auth-delegation";

/// Authorization of `public_key` until `expiration_ms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Key receiving the authority
    pub public_key: PublicKey,
    /// Absolute expiry, milliseconds since the Unix epoch
    pub expiration_ms: u64,
    /// Principals the delegation may be used against; `None` means unrestricted
    pub targets: Option<BTreeSet<Principal>>,
}

impl Delegation {
    /// Bytes the delegating key signs
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut h = hash::hasher();
        h.update_field(self.public_key.as_bytes());
        h.update(&self.expiration_ms.to_be_bytes());
        match &self.targets {
            None => h.update(&[0]),
            Some(targets) => {
                h.update(&[1]);
                h.update(&(targets.len() as u32).to_be_bytes());
                for target in targets {
                    h.update_field(target.as_bytes());
                }
            }
        }

        let mut payload = Vec::with_capacity(1 + DELEGATION_DOMAIN.len() + 32);
        payload.push(DELEGATION_DOMAIN.len() as u8);
        payload.extend_from_slice(DELEGATION_DOMAIN);
        payload.extend_from_slice(&h.finalize());
        payload
    }
}

/// Delegation plus the signature of the delegating key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDelegation {
    /// The delegation
    pub delegation: Delegation,
    /// Signature over [`Delegation::signing_payload`]
    pub signature: Signature,
}

/// Ordered delegations rooted at a device public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationChain {
    /// Public key of the originating device
    pub public_key: PublicKey,
    /// Hops, root first
    pub delegations: Vec<SignedDelegation>,
}

impl DelegationChain {
    /// Key holding the authority at the end of the chain
    pub fn session_public_key(&self) -> Option<&PublicKey> {
        self.delegations.last().map(|d| &d.delegation.public_key)
    }

    /// Earliest expiration along the chain
    pub fn expiration_ms(&self) -> Option<u64> {
        self.delegations
            .iter()
            .map(|d| d.delegation.expiration_ms)
            .min()
    }

    /// A chain is expired once any hop has expired; an empty chain is always expired
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiration_ms().map_or(true, |exp| now_ms >= exp)
    }

    /// Whether every hop allows use against `target`
    pub fn permits(&self, target: &Principal) -> bool {
        !self.delegations.is_empty()
            && self.delegations.iter().all(|d| {
                d.delegation
                    .targets
                    .as_ref()
                    .map_or(true, |targets| targets.contains(target))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delegation(expiration_ms: u64, targets: Option<BTreeSet<Principal>>) -> SignedDelegation {
        SignedDelegation {
            delegation: Delegation {
                public_key: PublicKey::from_bytes(vec![9; 44]),
                expiration_ms,
                targets,
            },
            signature: Signature::from_bytes(vec![0; 64]),
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let chain = DelegationChain {
            public_key: PublicKey::from_bytes(vec![1; 44]),
            delegations: vec![delegation(1_000, None)],
        };
        assert!(!chain.is_expired(999));
        assert!(chain.is_expired(1_000));

        let empty = DelegationChain {
            public_key: PublicKey::from_bytes(vec![1; 44]),
            delegations: vec![],
        };
        assert!(empty.is_expired(0));
    }

    #[test]
    fn test_target_scope() {
        let app = Principal::from_bytes(vec![1]);
        let other = Principal::from_bytes(vec![2]);
        let scoped = DelegationChain {
            public_key: PublicKey::from_bytes(vec![1; 44]),
            delegations: vec![delegation(1_000, Some([app.clone()].into_iter().collect()))],
        };
        assert!(scoped.permits(&app));
        assert!(!scoped.permits(&other));

        let open = DelegationChain {
            public_key: PublicKey::from_bytes(vec![1; 44]),
            delegations: vec![delegation(1_000, None)],
        };
        assert!(open.permits(&other));
    }

    #[test]
    fn test_payload_binds_every_field() {
        let base = delegation(1_000, None).delegation;
        let payload = base.signing_payload();
        assert_eq!(payload[0] as usize, DELEGATION_DOMAIN.len());
        assert_eq!(&payload[1..1 + DELEGATION_DOMAIN.len()], DELEGATION_DOMAIN);

        let mut later = base.clone();
        later.expiration_ms += 1;
        assert_ne!(later.signing_payload(), payload);

        let mut scoped = base.clone();
        scoped.targets = Some(BTreeSet::new());
        assert_ne!(scoped.signing_payload(), payload);
    }
}
