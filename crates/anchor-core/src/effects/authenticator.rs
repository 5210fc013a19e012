//! Authenticator Effects Trait Definitions
//!
//! Interface to a platform or roaming authenticator: the device that holds a
//! credential's private key and only uses it after a user-presence gesture
//! (biometric unlock, touching a security key).
//!
//! # Effect Classification
//!
//! - **Category**: External Collaborator
//! - **Implementation**: bound by the embedding application; `anchor-testkit`
//!   ships a software authenticator
//!
//! ## Ceremony rules
//!
//! - Every call is one user-visible ceremony. Callers must never retry a
//!   ceremony without a fresh user action.
//! - At most one ceremony may be in flight against an authenticator.
//! - Cancellation by the user is reported as `AnchorError::UserCancelled`,
//!   rejection or timeout as `AnchorError::AuthenticationFailed`.

use crate::errors::AnchorResult;
use crate::types::{CredentialId, KeyType, PublicKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the authenticator lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorAttachment {
    /// Built into the current device
    Platform,
    /// Removable security key
    CrossPlatform,
}

impl From<AuthenticatorAttachment> for KeyType {
    fn from(attachment: AuthenticatorAttachment) -> Self {
        match attachment {
            AuthenticatorAttachment::Platform => KeyType::Platform,
            AuthenticatorAttachment::CrossPlatform => KeyType::CrossPlatform,
        }
    }
}

/// Parameters of a credential creation ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCreation {
    /// Label shown by the authenticator
    pub display_name: String,
    /// Random user handle
    #[serde(with = "serde_bytes")]
    pub user_handle: Vec<u8>,
    /// Credentials the authenticator must not create a duplicate for
    pub exclude_credentials: Vec<CredentialId>,
    /// Required attachment, if any
    pub attachment: Option<AuthenticatorAttachment>,
}

/// Result of a credential creation ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCredential {
    /// Credential reference to present in later assertions
    pub credential_id: CredentialId,
    /// Encoded public key of the credential
    pub public_key: PublicKey,
    /// Attachment reported by the authenticator; `Unknown` when unreported
    pub key_type: KeyType,
}

/// Result of an assertion ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Credential the authenticator chose
    pub credential_id: CredentialId,
    /// Authenticator data covered by the signature
    #[serde(with = "serde_bytes")]
    pub authenticator_data: Vec<u8>,
    /// Client data covered by the signature; embeds the challenge
    #[serde(with = "serde_bytes")]
    pub client_data_json: Vec<u8>,
    /// Signature over authenticator data and the client data hash
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// WebAuthn-style authenticator ceremonies
#[async_trait]
pub trait AuthenticatorEffects: Send + Sync {
    /// Create a new credential
    async fn create_credential(&self, request: CredentialCreation) -> AnchorResult<NewCredential>;

    /// Sign `challenge` with any one of `allowed`; the authenticator picks
    async fn get_assertion(
        &self,
        challenge: &[u8],
        allowed: &[CredentialId],
    ) -> AnchorResult<Assertion>;
}

#[async_trait]
impl<T: AuthenticatorEffects + ?Sized> AuthenticatorEffects for Arc<T> {
    async fn create_credential(&self, request: CredentialCreation) -> AnchorResult<NewCredential> {
        (**self).create_credential(request).await
    }

    async fn get_assertion(
        &self,
        challenge: &[u8],
        allowed: &[CredentialId],
    ) -> AnchorResult<Assertion> {
        (**self).get_assertion(challenge, allowed).await
    }
}
