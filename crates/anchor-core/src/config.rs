//! Configuration for the anchor identity layer
//!
//! Values come from three layers, applied in order: compiled defaults, a TOML
//! file, and `ANCHOR_<SECTION>_<KEY>` environment variables. Policy published
//! by the credential registry (proof-of-work difficulty, delegation ceiling)
//! is applied last through [`AnchorConfig::apply_registry_policy`].

use crate::errors::{AnchorError, AnchorResult};
use crate::types::{Principal, RegistryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ANCHOR_";

const SECTIONS: &[&str] = &[
    "registry",
    "proof_of_work",
    "delegation",
    "registration",
    "device_link",
    "recovery",
];

const MINUTE_MS: u64 = 60 * 1000;
const DAY_MS: u64 = 24 * 60 * MINUTE_MS;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Credential registry identity
    pub registry: RegistryConfig,
    /// Registration proof-of-work parameters
    pub proof_of_work: ProofOfWorkConfig,
    /// Delegation lifetimes
    pub delegation: DelegationConfig,
    /// Registration flow limits
    pub registration: RegistrationConfig,
    /// Device-link polling and confirmation
    pub device_link: DeviceLinkConfig,
    /// Recovery phrase derivation
    pub recovery: RecoveryConfig,
}

/// Credential registry identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Hex-encoded principal of the registry; mixed into proof-of-work messages
    pub registry_id: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_id: "00000000000000070101".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Decoded registry principal
    pub fn principal(&self) -> AnchorResult<Principal> {
        Principal::from_hex(&self.registry_id)
    }
}

/// Proof-of-work parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofOfWorkConfig {
    /// Required number of leading zero bits in the proof hash
    pub difficulty_bits: u32,
    /// Accepted distance between proof timestamp and verifier clock
    pub max_clock_skew_ms: u64,
}

impl Default for ProofOfWorkConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: 16,
            max_clock_skew_ms: 5 * MINUTE_MS,
        }
    }
}

/// Delegation lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Lifetime of the session delegation minted at login
    pub session_ttl_ms: u64,
    /// Ceiling applied to every requested lifetime
    pub max_ttl_ms: u64,
    /// Lifetime used for application delegations when the caller gives none
    pub default_app_ttl_ms: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: 10 * MINUTE_MS,
            max_ttl_ms: 30 * DAY_MS,
            default_app_ttl_ms: 30 * MINUTE_MS,
        }
    }
}

/// Registration flow limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// CAPTCHA answers accepted before the flow fails
    pub max_captcha_attempts: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_captcha_attempts: 5,
        }
    }
}

/// Device-link polling and confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLinkConfig {
    /// Interval between registry polls on the originating device
    pub poll_interval_ms: u64,
    /// Lower bound for `poll_interval_ms`
    pub min_poll_interval_ms: u64,
    /// Confirmation code attempts before the tentative device expires
    pub confirmation_attempts: u32,
}

impl Default for DeviceLinkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_500,
            min_poll_interval_ms: 1_000,
            confirmation_attempts: 3,
        }
    }
}

impl DeviceLinkConfig {
    /// Poll interval with the floor applied
    pub fn effective_poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.max(self.min_poll_interval_ms)
    }
}

/// Recovery phrase derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Derivation path; every index is hardened during derivation
    pub derivation_path: Vec<u32>,
    /// Reject phrases whose BIP-39 checksum does not verify
    pub validate_checksum: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            derivation_path: vec![44, 223, 0, 0, 0],
            validate_checksum: false,
        }
    }
}

impl AnchorConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: &Path) -> AnchorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnchorError::internal(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> AnchorResult<Self> {
        toml::from_str(content).map_err(|e| AnchorError::invalid(format!("Invalid TOML: {e}")))
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> AnchorResult<String> {
        toml::to_string_pretty(self).map_err(|e| AnchorError::serialization(e.to_string()))
    }

    /// Apply `ANCHOR_<SECTION>_<KEY>` variables from the process environment
    pub fn merge_with_env(&mut self) -> AnchorResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `ANCHOR_<SECTION>_<KEY>` overrides from an arbitrary source.
    ///
    /// Variables that do not name a known section are ignored.
    pub fn merge_with_vars<I>(&mut self, vars: I) -> AnchorResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_lowercase();
            let Some(section) = SECTIONS
                .iter()
                .find(|s| rest.starts_with(&format!("{s}_")))
            else {
                continue;
            };
            let field = &rest[section.len() + 1..];
            self.set_from_string(&format!("{section}.{field}"), &value)?;
        }
        Ok(())
    }

    /// Overlay another configuration; values in `other` win
    pub fn merge_with(&mut self, other: &Self) -> AnchorResult<()> {
        let mut base = serde_json::to_value(&*self)?;
        let overlay = serde_json::to_value(other)?;
        merge_json_values(&mut base, &overlay);
        *self = serde_json::from_value(base)?;
        Ok(())
    }

    /// Set one value by dotted key, e.g. `proof_of_work.difficulty_bits`
    pub fn set_from_string(&mut self, key: &str, value: &str) -> AnchorResult<()> {
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| AnchorError::invalid(format!("Config key must be section.field: {key}")))?;

        let mut root = serde_json::to_value(&*self)?;
        let slot = root
            .get_mut(section)
            .and_then(|s| s.get_mut(field))
            .ok_or_else(|| AnchorError::invalid(format!("Unknown config key: {key}")))?;

        *slot = match &*slot {
            serde_json::Value::String(_) => serde_json::Value::String(value.to_string()),
            serde_json::Value::Array(_) => parse_list(value)?,
            _ => serde_json::from_str(value.trim())
                .map_err(|e| AnchorError::invalid(format!("Invalid value for {key}: {e}")))?,
        };

        *self = serde_json::from_value(root)
            .map_err(|e| AnchorError::invalid(format!("Invalid value for {key}: {e}")))?;
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> AnchorResult<()> {
        self.registry.principal()?;

        if self.proof_of_work.difficulty_bits == 0 || self.proof_of_work.difficulty_bits > 64 {
            return Err(AnchorError::invalid(
                "proof_of_work.difficulty_bits must be between 1 and 64",
            ));
        }
        if self.delegation.max_ttl_ms == 0 {
            return Err(AnchorError::invalid("delegation.max_ttl_ms must be positive"));
        }
        if self.delegation.session_ttl_ms == 0
            || self.delegation.session_ttl_ms > self.delegation.max_ttl_ms
        {
            return Err(AnchorError::invalid(
                "delegation.session_ttl_ms must be positive and within delegation.max_ttl_ms",
            ));
        }
        if self.registration.max_captcha_attempts == 0 {
            return Err(AnchorError::invalid(
                "registration.max_captcha_attempts must be at least 1",
            ));
        }
        if self.device_link.min_poll_interval_ms == 0 {
            return Err(AnchorError::invalid(
                "device_link.min_poll_interval_ms must be positive",
            ));
        }
        if self.device_link.poll_interval_ms < self.device_link.min_poll_interval_ms {
            return Err(AnchorError::invalid(
                "device_link.poll_interval_ms is below device_link.min_poll_interval_ms",
            ));
        }
        if self.recovery.derivation_path.is_empty() {
            return Err(AnchorError::invalid("recovery.derivation_path must not be empty"));
        }
        if self
            .recovery
            .derivation_path
            .iter()
            .any(|i| *i >= crate::types::HARDENED_OFFSET)
        {
            return Err(AnchorError::invalid(
                "recovery.derivation_path indices are hardened implicitly; give them unhardened",
            ));
        }
        Ok(())
    }

    /// Take over policy published by the credential registry
    pub fn apply_registry_policy(&mut self, policy: &RegistryPolicy) {
        tracing::debug!(
            difficulty_bits = policy.difficulty_bits,
            max_delegation_ttl_ms = policy.max_delegation_ttl_ms,
            "applying registry policy"
        );
        self.proof_of_work.difficulty_bits = policy.difficulty_bits;
        self.delegation.max_ttl_ms = policy.max_delegation_ttl_ms;
        self.delegation.session_ttl_ms = self.delegation.session_ttl_ms.min(policy.max_delegation_ttl_ms);
    }
}

fn parse_list(value: &str) -> AnchorResult<serde_json::Value> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| AnchorError::invalid(format!("Invalid list: {e}")));
    }
    let items = trimmed
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map(serde_json::Value::from)
                .map_err(|e| AnchorError::invalid(format!("Invalid list item {s:?}: {e}")))
        })
        .collect::<AnchorResult<Vec<_>>>()?;
    Ok(serde_json::Value::Array(items))
}

fn merge_json_values(target: &mut serde_json::Value, source: &serde_json::Value) {
    match (target.as_object_mut(), source.as_object()) {
        (Some(target_obj), Some(source_obj)) => {
            for (key, source_value) in source_obj {
                match target_obj.get_mut(key) {
                    Some(target_value) => merge_json_values(target_value, source_value),
                    None => {
                        target_obj.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        _ => *target = source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = AnchorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.proof_of_work.difficulty_bits, 16);
        assert_eq!(config.delegation.session_ttl_ms, 600_000);
        assert_eq!(config.recovery.derivation_path, vec![44, 223, 0, 0, 0]);
        assert!(!config.recovery.validate_checksum);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[proof_of_work]\ndifficulty_bits = 8\n\n[recovery]\nvalidate_checksum = true"
        )
        .unwrap();

        let config = AnchorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.proof_of_work.difficulty_bits, 8);
        assert_eq!(config.proof_of_work.max_clock_skew_ms, 300_000);
        assert!(config.recovery.validate_checksum);
        assert_eq!(config.delegation, DelegationConfig::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AnchorConfig::load_from_file(Path::new("/nonexistent/anchor.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AnchorConfig::default();
        config
            .merge_with_vars(vec![
                ("ANCHOR_PROOF_OF_WORK_DIFFICULTY_BITS".to_string(), "12".to_string()),
                ("ANCHOR_DEVICE_LINK_POLL_INTERVAL_MS".to_string(), "5000".to_string()),
                ("ANCHOR_RECOVERY_DERIVATION_PATH".to_string(), "44,1,2".to_string()),
                ("ANCHOR_REGISTRY_REGISTRY_ID".to_string(), "abcd".to_string()),
                ("ANCHOR_UNKNOWN_THING".to_string(), "x".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();

        assert_eq!(config.proof_of_work.difficulty_bits, 12);
        assert_eq!(config.device_link.poll_interval_ms, 5000);
        assert_eq!(config.recovery.derivation_path, vec![44, 1, 2]);
        assert_eq!(config.registry.registry_id, "abcd");
    }

    #[test]
    fn test_set_from_string_rejects_unknown_and_bad_values() {
        let mut config = AnchorConfig::default();
        assert!(config.set_from_string("delegation.nope", "1").is_err());
        assert!(config.set_from_string("delegation", "1").is_err());
        assert!(config
            .set_from_string("delegation.max_ttl_ms", "soon")
            .is_err());
        config
            .set_from_string("recovery.validate_checksum", "true")
            .unwrap();
        assert!(config.recovery.validate_checksum);
    }

    #[test]
    fn test_validate_poll_floor() {
        let mut config = AnchorConfig::default();
        config.device_link.poll_interval_ms = 10;
        assert!(config.validate().is_err());
        assert_eq!(config.device_link.effective_poll_interval_ms(), 1_000);
    }

    #[test]
    fn test_merge_with_overlays() {
        let mut base = AnchorConfig::default();
        let mut other = AnchorConfig::default();
        other.registration.max_captcha_attempts = 2;
        base.merge_with(&other).unwrap();
        assert_eq!(base.registration.max_captcha_attempts, 2);
    }

    #[test]
    fn test_registry_policy_overrides() {
        let mut config = AnchorConfig::default();
        config.apply_registry_policy(&RegistryPolicy {
            difficulty_bits: 20,
            max_delegation_ttl_ms: 5 * MINUTE_MS,
        });
        assert_eq!(config.proof_of_work.difficulty_bits, 20);
        assert_eq!(config.delegation.max_ttl_ms, 5 * MINUTE_MS);
        assert_eq!(config.delegation.session_ttl_ms, 5 * MINUTE_MS);
        config.validate().unwrap();
    }
}
