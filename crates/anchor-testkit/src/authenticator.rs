//! Software authenticator
//!
//! Holds Ed25519 credentials in memory and answers ceremonies the way a
//! platform authenticator would: assertions sign
//! `authenticator_data || sha256(client_data_json)` and carry the challenge
//! in the client data. Tests steer which credential the "user" picks and can
//! make the next ceremony fail or be cancelled.

use anchor_core::effects::{Assertion, AuthenticatorEffects, CredentialCreation, KeyMaterial, NewCredential};
use anchor_core::{AnchorError, AnchorResult, CredentialId, KeyType};
use anchor_effects::{assertion_signing_input, client_data_json, Ed25519KeyMaterial};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Relying party id hashed into authenticator data
pub const RP_ID: &str = "anchor.test";

// user present + user verified
const FLAGS: u8 = 0x05;

struct Credential {
    id: CredentialId,
    key: Arc<Ed25519KeyMaterial>,
}

#[derive(Default)]
struct AuthenticatorState {
    credentials: Vec<Credential>,
    created: u64,
    sign_count: u32,
    selected: Option<CredentialId>,
    offer_any: bool,
    cancel_next: bool,
    fail_next: Option<AnchorError>,
    last_allowed: Vec<CredentialId>,
    last_excluded: Vec<CredentialId>,
    ceremonies: u32,
}

/// In-memory authenticator with scriptable user behaviour
#[derive(Clone)]
pub struct SoftwareAuthenticator {
    seed: u64,
    state: Arc<Mutex<AuthenticatorState>>,
}

impl Default for SoftwareAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareAuthenticator {
    /// Authenticator with seed 0
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Authenticator whose created credentials derive from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            state: Arc::new(Mutex::new(AuthenticatorState::default())),
        }
    }

    /// Enroll a platform credential with a fixed key seed
    pub fn enroll(&self, key_seed: &[u8; 32]) -> NewCredential {
        self.enroll_with_type(key_seed, KeyType::Platform)
    }

    /// Enroll a credential with a fixed key seed and key type
    pub fn enroll_with_type(&self, key_seed: &[u8; 32], key_type: KeyType) -> NewCredential {
        let key = Ed25519KeyMaterial::from_seed(key_seed);
        let digest = Sha256::digest(key_seed);
        let mut id_bytes = b"cred-".to_vec();
        id_bytes.extend_from_slice(&digest[..16]);
        self.insert(id_bytes, key, key_type)
    }

    /// Credential the user picks in the next assertions; `None` picks the
    /// first allowed one
    pub fn select_credential(&self, credential_id: Option<CredentialId>) {
        self.state.lock().selected = credential_id;
    }

    /// Answer with the selected credential even when it was not offered
    pub fn offer_any_credential(&self, offer_any: bool) {
        self.state.lock().offer_any = offer_any;
    }

    /// Cancel the next ceremony as the user would
    pub fn cancel_next(&self) {
        self.state.lock().cancel_next = true;
    }

    /// Fail the next ceremony with `error`
    pub fn fail_next(&self, error: AnchorError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Credentials offered in the last assertion request
    pub fn last_allowed(&self) -> Vec<CredentialId> {
        self.state.lock().last_allowed.clone()
    }

    /// Credentials excluded in the last creation request
    pub fn last_excluded(&self) -> Vec<CredentialId> {
        self.state.lock().last_excluded.clone()
    }

    /// Ceremonies answered or refused so far
    pub fn ceremony_count(&self) -> u32 {
        self.state.lock().ceremonies
    }

    /// Number of credentials held
    pub fn credential_count(&self) -> usize {
        self.state.lock().credentials.len()
    }

    /// Key behind `credential_id`
    pub fn key(&self, credential_id: &CredentialId) -> Option<Arc<Ed25519KeyMaterial>> {
        self.state
            .lock()
            .credentials
            .iter()
            .find(|c| &c.id == credential_id)
            .map(|c| Arc::clone(&c.key))
    }

    fn insert(&self, id_bytes: Vec<u8>, key: Ed25519KeyMaterial, key_type: KeyType) -> NewCredential {
        #[allow(clippy::expect_used)]
        let credential_id = CredentialId::new(id_bytes).expect("credential ids are never empty");
        let public_key = key.der_public_key();
        self.state.lock().credentials.push(Credential {
            id: credential_id.clone(),
            key: Arc::new(key),
        });
        NewCredential {
            credential_id,
            public_key,
            key_type,
        }
    }

    fn begin_ceremony(&self) -> AnchorResult<()> {
        let mut state = self.state.lock();
        state.ceremonies += 1;
        if std::mem::take(&mut state.cancel_next) {
            return Err(AnchorError::UserCancelled);
        }
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        Ok(())
    }

    fn authenticator_data(sign_count: u32) -> Vec<u8> {
        let mut data = Sha256::digest(RP_ID.as_bytes()).to_vec();
        data.push(FLAGS);
        data.extend_from_slice(&sign_count.to_be_bytes());
        data
    }
}

#[async_trait]
impl AuthenticatorEffects for SoftwareAuthenticator {
    async fn create_credential(&self, request: CredentialCreation) -> AnchorResult<NewCredential> {
        self.begin_ceremony()?;

        let (created, seed) = {
            let mut state = self.state.lock();
            state.created += 1;
            state.last_excluded = request.exclude_credentials.clone();
            (state.created, self.seed)
        };
        let mut hasher = Sha256::new();
        hasher.update(b"software-authenticator");
        hasher.update(seed.to_le_bytes());
        hasher.update(created.to_le_bytes());
        let key_seed: [u8; 32] = hasher.finalize().into();

        let key_type = request
            .attachment
            .map(KeyType::from)
            .unwrap_or(KeyType::Platform);
        let mut id_bytes = b"cred-".to_vec();
        id_bytes.extend_from_slice(&Sha256::digest(key_seed)[..16]);

        if request
            .exclude_credentials
            .iter()
            .any(|c| c.as_bytes() == id_bytes.as_slice())
        {
            return Err(AnchorError::authentication(
                "authenticator already holds an excluded credential",
            ));
        }

        let credential = self.insert(id_bytes, Ed25519KeyMaterial::from_seed(&key_seed), key_type);
        tracing::debug!(display_name = %request.display_name, credential_id = %credential.credential_id, "software credential created");
        Ok(credential)
    }

    async fn get_assertion(
        &self,
        challenge: &[u8],
        allowed: &[CredentialId],
    ) -> AnchorResult<Assertion> {
        self.begin_ceremony()?;

        let (credential_id, key, sign_count) = {
            let mut state = self.state.lock();
            state.last_allowed = allowed.to_vec();

            let chosen = match &state.selected {
                Some(selected) if state.offer_any || allowed.contains(selected) => state
                    .credentials
                    .iter()
                    .find(|c| &c.id == selected),
                Some(_) => None,
                None => state.credentials.iter().find(|c| allowed.contains(&c.id)),
            };
            let chosen = chosen
                .map(|c| (c.id.clone(), Arc::clone(&c.key)))
                .ok_or_else(|| AnchorError::authentication("no allowed credential on this authenticator"))?;

            state.sign_count += 1;
            (chosen.0, chosen.1, state.sign_count)
        };

        let authenticator_data = Self::authenticator_data(sign_count);
        let client_data_json = client_data_json(challenge)?;
        let signature = key
            .sign(&assertion_signing_input(&authenticator_data, &client_data_json))
            .await?;

        Ok(Assertion {
            credential_id,
            authenticator_data,
            client_data_json,
            signature: signature.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::effects::AuthenticatorAttachment;
    use anchor_effects::encode_assertion;
    use anchor_effects::verify_device_signature;

    fn creation(exclude: Vec<CredentialId>) -> CredentialCreation {
        CredentialCreation {
            display_name: "laptop".to_string(),
            user_handle: vec![1; 16],
            exclude_credentials: exclude,
            attachment: Some(AuthenticatorAttachment::CrossPlatform),
        }
    }

    #[tokio::test]
    async fn test_assertion_verifies() {
        let auth = SoftwareAuthenticator::new();
        let cred = auth.create_credential(creation(vec![])).await.unwrap();
        assert_eq!(cred.key_type, KeyType::CrossPlatform);

        let assertion = auth
            .get_assertion(b"payload", &[cred.credential_id.clone()])
            .await
            .unwrap();
        assert_eq!(assertion.credential_id, cred.credential_id);
        let sig = encode_assertion(&assertion).unwrap();
        verify_device_signature(&cred.public_key, b"payload", &sig).unwrap();
    }

    #[tokio::test]
    async fn test_seeds_give_distinct_credentials() {
        let a = SoftwareAuthenticator::with_seed(1);
        let b = SoftwareAuthenticator::with_seed(2);
        let ca = a.create_credential(creation(vec![])).await.unwrap();
        let cb = b.create_credential(creation(vec![])).await.unwrap();
        assert_ne!(ca.public_key, cb.public_key);
        assert_eq!(b.last_excluded(), vec![]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let auth = SoftwareAuthenticator::new();
        let cred = auth.enroll(&[1; 32]);
        auth.cancel_next();
        assert_eq!(
            auth.get_assertion(b"c", &[cred.credential_id.clone()]).await,
            Err(AnchorError::UserCancelled)
        );
        auth.fail_next(AnchorError::authentication("timeout"));
        assert!(auth.get_assertion(b"c", &[cred.credential_id.clone()]).await.is_err());
        auth.get_assertion(b"c", &[cred.credential_id]).await.unwrap();
        assert_eq!(auth.ceremony_count(), 3);

        assert!(auth.get_assertion(b"c", &[]).await.is_err());
    }
}
