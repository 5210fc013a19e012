//! Device-link payload codec
//!
//! `<anchor>;<hex public key>[;<hex credential id>]`, carried in a
//! `#device=` URL fragment. An absent credential id is two segments; a
//! present one is a third, non-empty segment. A trailing empty segment is
//! rejected so that "absent" and "empty" never decode to the same payload.
//! Decoding only accepts the exact text `encode` produces: decimal anchor
//! without leading zeros and lowercase hex.
//!
//! The fragment may be prefixed with an `authorize;` marker when the link
//! was opened from inside the authorize flow.

use anchor_core::{
    parse_anchor_number, AnchorError, AnchorNumber, AnchorResult, CredentialId, PublicKey,
};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Fragment key under which the payload travels
pub const LINK_FRAGMENT_KEY: &str = "device";

const SEPARATOR: char = ';';
const AUTHORIZE_MARKER: &str = "authorize";

/// Candidate device offered for an anchor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkPayload {
    /// Anchor the device wants to join
    pub anchor: AnchorNumber,
    /// Public key of the candidate
    pub public_key: PublicKey,
    /// Credential reference of the candidate, if it has one
    pub credential_id: Option<CredentialId>,
}

impl LinkPayload {
    /// Compact URL-safe encoding
    pub fn encode(&self) -> String {
        let mut out = format!("{}{SEPARATOR}{}", self.anchor, self.public_key.to_hex());
        if let Some(credential_id) = &self.credential_id {
            out.push(SEPARATOR);
            out.push_str(&credential_id.to_hex());
        }
        out
    }

    /// Exact reverse of [`LinkPayload::encode`]
    pub fn decode(encoded: &str) -> AnchorResult<Self> {
        let segments: Vec<&str> = encoded.split(SEPARATOR).collect();
        let (anchor, public_key, credential_id) = match segments.as_slice() {
            [anchor, public_key] => (anchor, public_key, None),
            [anchor, public_key, credential_id] => {
                if credential_id.is_empty() {
                    return Err(AnchorError::invalid(
                        "device link has an empty credential segment",
                    ));
                }
                (anchor, public_key, Some(CredentialId::from_hex(credential_id)?))
            }
            _ => {
                return Err(AnchorError::invalid(format!(
                    "device link must have 2 or 3 segments, found {}",
                    segments.len()
                )))
            }
        };

        let payload = Self {
            anchor: parse_anchor_number(anchor)?,
            public_key: PublicKey::from_hex(public_key)?,
            credential_id,
        };
        if payload.encode() != encoded {
            return Err(AnchorError::invalid("device link is not in canonical form"));
        }
        Ok(payload)
    }

    /// `base` with this payload as its `#device=` fragment
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_fragment(Some(&format!("{LINK_FRAGMENT_KEY}={}", self.encode())));
        url
    }

    /// Payload carried by `url`, if its fragment holds one
    pub fn from_url(url: &Url) -> AnchorResult<Option<Self>> {
        let Some(fragment) = url.fragment() else {
            return Ok(None);
        };
        let (_, fragment) = split_authorize(fragment);
        match fragment.strip_prefix(LINK_FRAGMENT_KEY).and_then(|r| r.strip_prefix('=')) {
            Some(encoded) => Self::decode(encoded).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Display for LinkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for LinkPayload {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Remove link state from `url`'s fragment.
///
/// A fragment naming the authorize flow keeps just that marker so an
/// in-progress authorization survives; anything else is dropped.
pub fn clear_link(url: &mut Url) {
    let keep_authorize = url.fragment().is_some_and(|fragment| split_authorize(fragment).0);
    if keep_authorize {
        url.set_fragment(Some(AUTHORIZE_MARKER));
    } else {
        url.set_fragment(None);
    }
}

/// Split a leading authorize marker off `fragment`
fn split_authorize(fragment: &str) -> (bool, &str) {
    match fragment.strip_prefix(AUTHORIZE_MARKER) {
        Some("") => (true, ""),
        Some(rest) => match rest.strip_prefix(SEPARATOR) {
            Some(rest) => (true, rest),
            None => (false, fragment),
        },
        None => (false, fragment),
    }
}
