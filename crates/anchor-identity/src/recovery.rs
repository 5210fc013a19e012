//! Recovery phrases and recovery devices
//!
//! A recovery phrase is a BIP-39 mnemonic. Its seed (PBKDF2-HMAC-SHA512,
//! 2048 rounds, salt `"mnemonic"`) is run through SLIP-0010 Ed25519
//! derivation over a fully hardened path, so the same phrase and path always
//! give the same key. Whether the mnemonic checksum is checked first is a
//! configuration choice (`recovery.validate_checksum`); by default phrases
//! from other tools are accepted as typed.
//!
//! The phrase is shown to the user prefixed with the anchor number; parsing
//! accepts it with or without that prefix.

use crate::context::IdentityEffects;
use crate::devices::DeviceManager;
use crate::session::Session;
use anchor_core::effects::{AuthenticatorAttachment, CredentialCreation};
use anchor_core::{
    AnchorError, AnchorNumber, AnchorResult, DeviceData, Purpose, RecoveryConfig, HARDENED_OFFSET,
};
use anchor_effects::Ed25519KeyMaterial;
use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

type HmacSha512 = Hmac<Sha512>;

const SEED_SALT: &[u8] = b"mnemonic";
const SEED_ROUNDS: u32 = 2048;
const SLIP10_CURVE_KEY: &[u8] = b"ed25519 seed";

/// Entropy of a generated phrase (24 words)
pub const PHRASE_ENTROPY_BYTES: usize = 32;

// =============================================================================
// PHRASE
// =============================================================================

/// A recovery phrase as entered or displayed, optionally carrying its anchor
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryPhrase {
    anchor: Option<AnchorNumber>,
    words: Zeroizing<String>,
}

impl RecoveryPhrase {
    /// Parse user input: `[anchor] word word ...`
    pub fn parse(input: &str) -> AnchorResult<Self> {
        let mut tokens = input.split_whitespace().peekable();
        let anchor = match tokens.peek() {
            Some(first) if first.chars().all(|c| c.is_ascii_digit()) => {
                let anchor = first.parse::<AnchorNumber>()?;
                tokens.next();
                Some(anchor)
            }
            _ => None,
        };

        let words = tokens.collect::<Vec<_>>().join(" ");
        if words.is_empty() {
            return Err(AnchorError::invalid("recovery phrase has no words"));
        }
        Ok(Self {
            anchor,
            words: Zeroizing::new(words),
        })
    }

    /// Fresh phrase from `entropy`
    pub fn from_entropy(anchor: Option<AnchorNumber>, entropy: &[u8]) -> AnchorResult<Self> {
        let mnemonic = Mnemonic::from_entropy(entropy)
            .map_err(|e| AnchorError::invalid(format!("invalid mnemonic entropy: {e}")))?;
        Ok(Self {
            anchor,
            words: Zeroizing::new(mnemonic.to_string()),
        })
    }

    /// Anchor number written in front of the words, if any
    pub fn anchor(&self) -> Option<AnchorNumber> {
        self.anchor
    }

    /// The mnemonic words, single-space separated
    pub fn mnemonic(&self) -> &str {
        &self.words
    }

    /// Number of words
    pub fn word_count(&self) -> usize {
        self.words.split(' ').count()
    }

    /// Whether the words form a valid English BIP-39 mnemonic
    pub fn has_valid_checksum(&self) -> bool {
        Mnemonic::parse_in_normalized(Language::English, &self.words).is_ok()
    }
}

/// Displayed form: anchor number (if any) followed by the words
impl fmt::Display for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Some(anchor) => write!(f, "{anchor} {}", self.mnemonic()),
            None => f.write_str(self.mnemonic()),
        }
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPhrase")
            .field("anchor", &self.anchor)
            .field("words", &self.word_count())
            .finish()
    }
}

// =============================================================================
// DERIVATION
// =============================================================================

/// Derives recovery keys from mnemonics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryDeriver {
    path: Vec<u32>,
    validate_checksum: bool,
}

impl RecoveryDeriver {
    /// Deriver for an explicit path
    pub fn new(path: Vec<u32>, validate_checksum: bool) -> Self {
        Self {
            path,
            validate_checksum,
        }
    }

    /// Deriver for the configured path and checksum policy
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(config.derivation_path.clone(), config.validate_checksum)
    }

    /// Derivation path (every index is hardened)
    pub fn path(&self) -> &[u32] {
        &self.path
    }

    /// Key for `mnemonic` on the configured path
    pub fn derive(&self, mnemonic: &str) -> AnchorResult<Ed25519KeyMaterial> {
        self.derive_with_path(mnemonic, &self.path)
    }

    /// Key for `mnemonic` on `path`
    pub fn derive_with_path(
        &self,
        mnemonic: &str,
        path: &[u32],
    ) -> AnchorResult<Ed25519KeyMaterial> {
        if self.validate_checksum {
            Mnemonic::parse_in_normalized(Language::English, mnemonic).map_err(|e| {
                AnchorError::validation(format!("recovery phrase is not a valid mnemonic: {e}"))
            })?;
        }

        let mut seed = [0u8; 64];
        pbkdf2::pbkdf2_hmac::<Sha512>(mnemonic.as_bytes(), SEED_SALT, SEED_ROUNDS, &mut seed);
        let result = slip10_ed25519(&seed, path);
        seed.zeroize();

        let mut key = result?;
        let material = Ed25519KeyMaterial::from_seed(&key);
        key.zeroize();
        Ok(material)
    }
}

/// SLIP-0010 Ed25519 private key for `seed` along the hardened `path`
fn slip10_ed25519(seed: &[u8], path: &[u32]) -> AnchorResult<[u8; 32]> {
    let (mut key, mut chain_code) = hmac_split(SLIP10_CURVE_KEY, &[seed])?;

    for index in path {
        if *index >= HARDENED_OFFSET {
            return Err(AnchorError::invalid(format!(
                "derivation index {index} must be given unhardened"
            )));
        }
        let hardened = (index | HARDENED_OFFSET).to_be_bytes();
        let (child_key, child_chain) =
            hmac_split(&chain_code, &[&[0u8][..], &key[..], &hardened[..]])?;
        key.zeroize();
        chain_code.zeroize();
        key = child_key;
        chain_code = child_chain;
    }

    chain_code.zeroize();
    Ok(key)
}

fn hmac_split(key: &[u8], data: &[&[u8]]) -> AnchorResult<([u8; 32], [u8; 32])> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| AnchorError::crypto(format!("HMAC key rejected: {e}")))?;
    for part in data {
        mac.update(part);
    }
    let mut out = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&out[..32]);
    right.copy_from_slice(&out[32..]);
    out.as_mut_slice().zeroize();
    Ok((left, right))
}

// =============================================================================
// SETUP
// =============================================================================

/// Adds recovery mechanisms to a logged-in anchor
pub struct RecoverySetup<'s, E: IdentityEffects> {
    session: &'s mut Session<E>,
}

impl<'s, E: IdentityEffects + 'static> RecoverySetup<'s, E> {
    /// Set up recovery for the session's anchor
    pub fn new(session: &'s mut Session<E>) -> Self {
        Self { session }
    }

    /// Generate a 24-word phrase and register its key as a recovery device.
    ///
    /// Returns the phrase in its displayed form, prefixed by the anchor.
    pub async fn setup_recovery_phrase(&mut self) -> AnchorResult<RecoveryPhrase> {
        let anchor = self.session.anchor();
        let ctx = self.session.context().clone();

        let entropy = Zeroizing::new(ctx.effects().random_bytes(PHRASE_ENTROPY_BYTES).await);
        let phrase = RecoveryPhrase::from_entropy(Some(anchor), &entropy)?;
        let key = RecoveryDeriver::from_config(&ctx.config().recovery).derive(phrase.mnemonic())?;

        DeviceManager::new(&mut *self.session)
            .add_device(DeviceData::seed_phrase_recovery(key.der_public_key()))
            .await?;
        tracing::info!(%anchor, "recovery phrase registered");
        Ok(phrase)
    }

    /// Create a credential on a removable security key and register it for recovery
    pub async fn setup_recovery_security_key(&mut self, alias: &str) -> AnchorResult<DeviceData> {
        let anchor = self.session.anchor();
        let ctx = self.session.context().clone();

        let credential = {
            let _ceremony = ctx.gate().begin("create recovery credential")?;
            let user_handle = ctx.effects().random_bytes(16).await;
            ctx.effects()
                .create_credential(CredentialCreation {
                    display_name: alias.to_string(),
                    user_handle,
                    exclude_credentials: self.session.snapshot().credential_ids(),
                    attachment: Some(AuthenticatorAttachment::CrossPlatform),
                })
                .await?
        };

        let device = DeviceData::authenticator(
            alias,
            credential.public_key,
            credential.credential_id,
            AuthenticatorAttachment::CrossPlatform.into(),
            Purpose::Recovery,
        );
        DeviceManager::new(&mut *self.session)
            .add_device(device.clone())
            .await?;
        tracing::info!(%anchor, "recovery security key registered");
        Ok(device)
    }
}
