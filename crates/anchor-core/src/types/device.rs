//! Device descriptors and anchor snapshots
//!
//! A device is identified by its public key. Devices created through an
//! authenticator ceremony carry the credential id the authenticator needs to
//! locate the key again; seed-phrase devices never do.

use super::identifiers::{AnchorNumber, CredentialId, PublicKey};
use crate::errors::{AnchorError, AnchorResult};
use serde::{Deserialize, Serialize};

/// Longest accepted device alias, in characters
pub const MAX_ALIAS_LEN: usize = 64;

/// Kind of key backing a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Authenticator built into the device (biometric unlock)
    Platform,
    /// Roaming authenticator (USB/NFC security key)
    CrossPlatform,
    /// Key derived from a recovery phrase
    SeedPhrase,
    /// Authenticator of undetermined attachment
    Unknown,
}

impl KeyType {
    /// Whether keys of this type come out of an authenticator ceremony
    pub fn requires_credential_id(&self) -> bool {
        !matches!(self, KeyType::SeedPhrase)
    }
}

/// What a device may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Regular login
    Authentication,
    /// Regaining access after losing authentication devices
    Recovery,
}

/// Whether mutating the device requires authenticating with the device itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    /// Only the device itself may remove or replace it
    Protected,
    /// Any device of the anchor may remove or replace it
    #[default]
    Unprotected,
}

/// Device descriptor as stored by the credential registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceData {
    /// Human-readable label
    pub alias: String,
    /// Device public key; the identity of the device
    pub public_key: PublicKey,
    /// Authenticator credential reference
    pub credential_id: Option<CredentialId>,
    /// Kind of key
    pub key_type: KeyType,
    /// Allowed use
    pub purpose: Purpose,
    /// Mutation protection
    pub protection: Protection,
}

impl DeviceData {
    /// Descriptor for a credential produced by an authenticator ceremony
    pub fn authenticator(
        alias: impl Into<String>,
        public_key: PublicKey,
        credential_id: CredentialId,
        key_type: KeyType,
        purpose: Purpose,
    ) -> Self {
        Self {
            alias: alias.into(),
            public_key,
            credential_id: Some(credential_id),
            key_type,
            purpose,
            protection: Protection::Unprotected,
        }
    }

    /// Descriptor for a key derived from a recovery phrase
    pub fn seed_phrase_recovery(public_key: PublicKey) -> Self {
        Self {
            alias: "Recovery phrase".to_string(),
            public_key,
            credential_id: None,
            key_type: KeyType::SeedPhrase,
            purpose: Purpose::Recovery,
            protection: Protection::Unprotected,
        }
    }

    /// Check the descriptor invariants before it is sent anywhere
    pub fn validate(&self) -> AnchorResult<()> {
        if self.alias.trim().is_empty() {
            return Err(AnchorError::invalid("device alias must not be empty"));
        }
        if self.alias.chars().count() > MAX_ALIAS_LEN {
            return Err(AnchorError::invalid(format!(
                "device alias longer than {MAX_ALIAS_LEN} characters"
            )));
        }
        if self.public_key.as_bytes().is_empty() {
            return Err(AnchorError::invalid("device public key must not be empty"));
        }
        match (self.key_type.requires_credential_id(), &self.credential_id) {
            (true, None) => Err(AnchorError::invalid(
                "authenticator device requires a credential id",
            )),
            (false, Some(_)) => Err(AnchorError::invalid(
                "seed phrase device must not carry a credential id",
            )),
            _ => Ok(()),
        }
    }

    /// Whether this device can be used for regular login
    pub fn is_authentication(&self) -> bool {
        self.purpose == Purpose::Authentication
    }

    /// Whether this device is a recovery mechanism
    pub fn is_recovery(&self) -> bool {
        self.purpose == Purpose::Recovery
    }
}

/// Devices registered for one anchor at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Owning anchor
    pub anchor: AnchorNumber,
    /// Registered devices in registry order
    pub devices: Vec<DeviceData>,
}

impl DeviceSnapshot {
    /// Create a snapshot
    pub fn new(anchor: AnchorNumber, devices: Vec<DeviceData>) -> Self {
        Self { anchor, devices }
    }

    /// Devices usable for regular login
    pub fn authentication_devices(&self) -> Vec<DeviceData> {
        self.devices
            .iter()
            .filter(|d| d.is_authentication())
            .cloned()
            .collect()
    }

    /// Devices registered as recovery mechanisms
    pub fn recovery_devices(&self) -> Vec<DeviceData> {
        self.devices
            .iter()
            .filter(|d| d.is_recovery())
            .cloned()
            .collect()
    }

    /// Find a device by public key
    pub fn find(&self, public_key: &PublicKey) -> Option<&DeviceData> {
        self.devices.iter().find(|d| &d.public_key == public_key)
    }

    /// Whether a device with this public key is registered
    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.find(public_key).is_some()
    }

    /// Every credential id known to the anchor
    pub fn credential_ids(&self) -> Vec<CredentialId> {
        self.devices
            .iter()
            .filter_map(|d| d.credential_id.clone())
            .collect()
    }

    /// Number of devices left if `public_key` were removed
    pub fn remaining_after_removal(&self, public_key: &PublicKey) -> usize {
        self.devices
            .iter()
            .filter(|d| &d.public_key != public_key)
            .count()
    }

    /// True when the anchor has no recovery device at all
    pub fn needs_recovery_mechanism(&self) -> bool {
        !self.devices.iter().any(DeviceData::is_recovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(b: u8) -> CredentialId {
        CredentialId::new(vec![b; 16]).unwrap()
    }

    #[test]
    fn test_credential_reference_invariant() {
        let mut device = DeviceData::authenticator(
            "laptop",
            PublicKey::from_bytes(vec![1; 32]),
            cred(1),
            KeyType::Platform,
            Purpose::Authentication,
        );
        device.validate().unwrap();

        device.credential_id = None;
        assert!(device.validate().is_err());

        let mut phrase = DeviceData::seed_phrase_recovery(PublicKey::from_bytes(vec![2; 32]));
        phrase.validate().unwrap();
        phrase.credential_id = Some(cred(2));
        assert!(phrase.validate().is_err());
    }

    #[test]
    fn test_alias_length() {
        let mut device = DeviceData::seed_phrase_recovery(PublicKey::from_bytes(vec![2; 32]));
        device.alias = "x".repeat(MAX_ALIAS_LEN);
        device.validate().unwrap();
        device.alias.push('x');
        assert!(device.validate().is_err());
    }

    #[test]
    fn test_snapshot_filters() {
        let a = DeviceData::authenticator(
            "a",
            PublicKey::from_bytes(vec![1]),
            cred(1),
            KeyType::Platform,
            Purpose::Authentication,
        );
        let r = DeviceData::seed_phrase_recovery(PublicKey::from_bytes(vec![2]));
        let snapshot = DeviceSnapshot::new(AnchorNumber(7), vec![a.clone()]);
        assert!(snapshot.needs_recovery_mechanism());
        assert_eq!(snapshot.remaining_after_removal(&a.public_key), 0);

        let snapshot = DeviceSnapshot::new(AnchorNumber(7), vec![a.clone(), r.clone()]);
        assert!(!snapshot.needs_recovery_mechanism());
        assert_eq!(snapshot.authentication_devices(), vec![a.clone()]);
        assert_eq!(snapshot.recovery_devices(), vec![r]);
        assert_eq!(snapshot.credential_ids(), vec![cred(1)]);
        assert!(snapshot.contains(&a.public_key));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&KeyType::CrossPlatform).unwrap(),
            "\"cross_platform\""
        );
        assert_eq!(
            serde_json::to_string(&KeyType::SeedPhrase).unwrap(),
            "\"seed_phrase\""
        );
    }
}
