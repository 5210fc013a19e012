//! Device link commands
//!
//! Encodes the `#device=` fragment a new device shows and decodes one back,
//! for inspecting links reported by users.

use anchor_core::{parse_anchor_number, CredentialId, PublicKey};
use anchor_identity::LinkPayload;
use anyhow::{Context, Result};
use clap::Args;
use url::Url;

/// Device link operations
#[derive(Args)]
pub struct LinkCommand {
    /// Action to perform
    #[command(subcommand)]
    pub action: LinkAction,
}

/// Device link operations
#[derive(clap::Subcommand)]
pub enum LinkAction {
    /// Build a link URL for a candidate device
    Encode(EncodeArgs),
    /// Decode a link URL or bare payload
    Decode(DecodeArgs),
}

/// Arguments for encoding
#[derive(Args)]
pub struct EncodeArgs {
    /// Anchor the device joins
    #[arg(short, long)]
    anchor: String,

    /// Hex public key of the candidate
    #[arg(short, long)]
    public_key: String,

    /// Hex credential id of the candidate
    #[arg(long)]
    credential_id: Option<String>,

    /// Page the fragment is attached to
    #[arg(long, default_value = "https://identity.ic0.app/")]
    base_url: String,
}

/// Arguments for decoding
#[derive(Args)]
pub struct DecodeArgs {
    /// Link URL or `<anchor>;<public key>[;<credential id>]`
    input: String,
}

pub fn run(cmd: LinkCommand) -> Result<()> {
    match cmd.action {
        LinkAction::Encode(args) => println!("{}", encode(&args)?),
        LinkAction::Decode(args) => {
            let payload = decode(&args.input)?;
            println!("anchor:        {}", payload.anchor);
            println!("public key:    {}", payload.public_key.to_hex());
            match &payload.credential_id {
                Some(id) => println!("credential id: {}", id.to_hex()),
                None => println!("credential id: none"),
            }
        }
    }
    Ok(())
}

fn encode(args: &EncodeArgs) -> Result<Url> {
    let base = Url::parse(&args.base_url).context("invalid base url")?;
    let payload = LinkPayload {
        anchor: parse_anchor_number(&args.anchor)?,
        public_key: PublicKey::from_hex(&args.public_key)?,
        credential_id: args
            .credential_id
            .as_deref()
            .map(CredentialId::from_hex)
            .transpose()?,
    };
    Ok(payload.to_url(&base))
}

fn decode(input: &str) -> Result<LinkPayload> {
    let input = input.trim();
    match Url::parse(input) {
        Ok(url) => LinkPayload::from_url(&url)?
            .with_context(|| format!("{input} carries no device link")),
        Err(_) => Ok(input.parse::<LinkPayload>()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::AnchorNumber;

    fn args(credential_id: Option<&str>) -> EncodeArgs {
        EncodeArgs {
            anchor: "10000".to_string(),
            public_key: "abcd".to_string(),
            credential_id: credential_id.map(str::to_string),
            base_url: "https://identity.example/".to_string(),
        }
    }

    #[test]
    fn test_encode_then_decode_url() {
        let url = encode(&args(Some("0102"))).unwrap();
        assert_eq!(url.as_str(), "https://identity.example/#device=10000;abcd;0102");

        let payload = decode(url.as_str()).unwrap();
        assert_eq!(payload.anchor, AnchorNumber(10_000));
        assert_eq!(payload.credential_id, Some(CredentialId::from_hex("0102").unwrap()));
    }

    #[test]
    fn test_decode_bare_payload() {
        let payload = decode(" 42;abcd ").unwrap();
        assert_eq!(payload.anchor, AnchorNumber(42));
        assert_eq!(payload.credential_id, None);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(decode("https://identity.example/").is_err());
        assert!(decode("42;abcd;").is_err());
        assert!(encode(&EncodeArgs {
            anchor: "12x".to_string(),
            ..args(None)
        })
        .is_err());
        assert!(encode(&args(Some(""))).is_err());
    }
}
