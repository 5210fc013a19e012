//! Recovery phrase commands
//!
//! `derive` prints the device public key a phrase maps to, which is what the
//! registry stores for a seed-phrase recovery device. Phrases are read from
//! stdin unless passed explicitly and are never logged.

use anchor_core::effects::RandomEffects;
use anchor_core::{AnchorConfig, AnchorNumber, PublicKey};
use anchor_effects::RealRandomHandler;
use anchor_identity::recovery::PHRASE_ENTROPY_BYTES;
use anchor_identity::{RecoveryDeriver, RecoveryPhrase};
use anyhow::{bail, Result};
use clap::Args;
use std::io::Read;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Recovery phrase operations
#[derive(Args)]
pub struct RecoveryCommand {
    /// Action to perform
    #[command(subcommand)]
    pub action: RecoveryAction,
}

/// Recovery phrase operations
#[derive(clap::Subcommand)]
pub enum RecoveryAction {
    /// Generate a fresh 24-word phrase
    Generate(GenerateArgs),
    /// Derive the recovery device public key of a phrase
    Derive(DeriveArgs),
}

/// Arguments for phrase generation
#[derive(Args)]
pub struct GenerateArgs {
    /// Anchor number to print in front of the words
    #[arg(short, long)]
    anchor: Option<u64>,
}

/// Arguments for key derivation
#[derive(Args)]
pub struct DeriveArgs {
    /// Phrase, optionally prefixed by its anchor number (read from stdin if omitted)
    #[arg(short, long)]
    phrase: Option<String>,

    /// Comma-separated unhardened path overriding `recovery.derivation_path`
    #[arg(long, value_delimiter = ',')]
    path: Option<Vec<u32>>,

    /// Reject phrases with an invalid checksum
    #[arg(long)]
    strict: bool,
}

pub async fn run(cmd: RecoveryCommand, config: &AnchorConfig) -> Result<()> {
    match cmd.action {
        RecoveryAction::Generate(args) => {
            let entropy = Zeroizing::new(
                RealRandomHandler::new()
                    .random_bytes(PHRASE_ENTROPY_BYTES)
                    .await,
            );
            let phrase = RecoveryPhrase::from_entropy(args.anchor.map(AnchorNumber), &entropy)?;
            let public_key = derive(config, &phrase, None, false)?;
            println!("{phrase}");
            println!("public key: {}", public_key.to_hex());
        }
        RecoveryAction::Derive(args) => {
            let input = match args.phrase {
                Some(phrase) => Zeroizing::new(phrase),
                None => {
                    let mut buf = Zeroizing::new(String::new());
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let phrase = RecoveryPhrase::parse(&input)?;
            if !phrase.has_valid_checksum() {
                warn!("phrase is not a valid BIP-39 mnemonic");
            }
            let public_key = derive(config, &phrase, args.path, args.strict)?;
            if let Some(anchor) = phrase.anchor() {
                println!("anchor:     {anchor}");
            }
            println!("public key: {}", public_key.to_hex());
        }
    }
    Ok(())
}

fn derive(
    config: &AnchorConfig,
    phrase: &RecoveryPhrase,
    path: Option<Vec<u32>>,
    strict: bool,
) -> Result<PublicKey> {
    let path = path.unwrap_or_else(|| config.recovery.derivation_path.clone());
    if path.is_empty() {
        bail!("derivation path must not be empty");
    }
    debug!(?path, words = phrase.word_count(), "deriving recovery key");
    let deriver = RecoveryDeriver::new(path, strict || config.recovery.validate_checksum);
    Ok(deriver.derive(phrase.mnemonic())?.der_public_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase() -> RecoveryPhrase {
        RecoveryPhrase::from_entropy(Some(AnchorNumber(10_000)), &[3u8; 32]).unwrap()
    }

    #[test]
    fn test_derivation_ignores_anchor_prefix() {
        let config = AnchorConfig::default();
        let bare = RecoveryPhrase::parse(phrase().mnemonic()).unwrap();
        assert_eq!(
            derive(&config, &phrase(), None, false).unwrap(),
            derive(&config, &bare, None, false).unwrap()
        );
    }

    #[test]
    fn test_path_override_changes_key() {
        let config = AnchorConfig::default();
        let default = derive(&config, &phrase(), None, false).unwrap();
        let other = derive(&config, &phrase(), Some(vec![44, 223, 0, 0, 1]), false).unwrap();
        assert_ne!(default, other);
        assert!(derive(&config, &phrase(), Some(vec![]), false).is_err());
    }

    #[test]
    fn test_strict_rejects_bad_checksum() {
        let config = AnchorConfig::default();
        let typo = RecoveryPhrase::parse(&"abandon ".repeat(24)).unwrap();
        assert!(derive(&config, &typo, None, false).is_ok());
        assert!(derive(&config, &typo, None, true).is_err());
    }
}
