//! Key material that refuses to sign

use anchor_core::effects::KeyMaterial;
use anchor_core::{AnchorError, AnchorResult, PublicKey, Signature};
use async_trait::async_trait;

/// Signer whose ceremony always fails with a fixed error
#[derive(Debug, Clone)]
pub struct FailingKeyMaterial {
    error: AnchorError,
}

impl FailingKeyMaterial {
    /// The user cancels every signing ceremony
    pub fn cancelled() -> Self {
        Self {
            error: AnchorError::UserCancelled,
        }
    }

    /// Every signing ceremony fails with an authentication error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: AnchorError::authentication(message),
        }
    }
}

#[async_trait]
impl KeyMaterial for FailingKeyMaterial {
    fn public_key(&self) -> AnchorResult<PublicKey> {
        Err(AnchorError::NotYetResolved)
    }

    async fn sign(&self, _message: &[u8]) -> AnchorResult<Signature> {
        Err(self.error.clone())
    }
}
