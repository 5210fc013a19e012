//! Signing capability abstraction.
//!
//! Anything that can sign an arbitrary byte string and name its public key:
//! an authenticator-bound credential, a key derived from a recovery phrase,
//! or an ephemeral session key. The algorithm is the implementor's business.
//!
//! `public_key` is fallible because some key material binds lazily: a
//! multi-credential resolver only knows which key it is after its first
//! ceremony.

use crate::errors::AnchorResult;
use crate::types::{PublicKey, Signature};
use async_trait::async_trait;
use std::sync::Arc;

/// A signing key identified by its DER-encoded public key
#[async_trait]
pub trait KeyMaterial: Send + Sync {
    /// Encoded public key
    fn public_key(&self) -> AnchorResult<PublicKey>;

    /// Sign `message`; may run a physical ceremony
    async fn sign(&self, message: &[u8]) -> AnchorResult<Signature>;
}

#[async_trait]
impl<T: KeyMaterial + ?Sized> KeyMaterial for Arc<T> {
    fn public_key(&self) -> AnchorResult<PublicKey> {
        (**self).public_key()
    }

    async fn sign(&self, message: &[u8]) -> AnchorResult<Signature> {
        (**self).sign(message).await
    }
}
