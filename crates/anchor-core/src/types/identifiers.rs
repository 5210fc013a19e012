//! Identifiers and opaque byte newtypes.

use crate::errors::{AnchorError, AnchorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable numeric identifier of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorNumber(pub u64);

impl AnchorNumber {
    /// Raw numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnchorNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnchorNumber {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_anchor_number(s)
    }
}

impl From<u64> for AnchorNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Parse user input into an anchor number.
///
/// Surrounding whitespace is ignored; anything other than ASCII digits is
/// rejected, as is a value that does not fit in 64 bits.
pub fn parse_anchor_number(input: &str) -> AnchorResult<AnchorNumber> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AnchorError::invalid(format!(
            "not an identity anchor: {trimmed:?}"
        )));
    }
    trimmed
        .parse::<u64>()
        .map(AnchorNumber)
        .map_err(|_| AnchorError::invalid(format!("identity anchor out of range: {trimmed}")))
}

macro_rules! byte_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "serde_bytes")] Vec<u8>);

        impl $name {
            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Consume into the raw bytes
            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            /// Lowercase hex encoding
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

byte_newtype!(
    /// Encoded public key of a device or session key (DER or COSE bytes).
    PublicKey
);

byte_newtype!(
    /// Opaque credential reference returned by a physical authenticator.
    ///
    /// Never empty.
    CredentialId
);

byte_newtype!(
    /// Principal naming a delegation target.
    Principal
);

byte_newtype!(
    /// Signature bytes produced by key material.
    Signature
);

impl PublicKey {
    /// Wrap encoded public key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> AnchorResult<Self> {
        let bytes = hex::decode(s)?;
        if bytes.is_empty() {
            return Err(AnchorError::invalid("public key must not be empty"));
        }
        Ok(Self(bytes))
    }
}

impl CredentialId {
    /// Wrap credential bytes, rejecting an empty reference
    pub fn new(bytes: impl Into<Vec<u8>>) -> AnchorResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AnchorError::invalid("credential id must not be empty"));
        }
        Ok(Self(bytes))
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> AnchorResult<Self> {
        Self::new(hex::decode(s)?)
    }
}

impl Principal {
    /// Wrap principal bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> AnchorResult<Self> {
        Ok(Self(hex::decode(s)?))
    }
}

impl Signature {
    /// Wrap signature bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}
