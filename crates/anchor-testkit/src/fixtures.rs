//! Shared fixtures

use crate::authenticator::SoftwareAuthenticator;
use crate::effects::TestEffects;
use anchor_core::{AnchorConfig, AnchorNumber, DeviceData, KeyType, Purpose};
use tracing_subscriber::EnvFilter;

/// Difficulty used by tests; solved in a handful of hashes
pub const TEST_DIFFICULTY_BITS: u32 = 4;

/// Default configuration with a cheap proof of work
pub fn test_config() -> AnchorConfig {
    let mut config = AnchorConfig::default();
    config.proof_of_work.difficulty_bits = TEST_DIFFICULTY_BITS;
    config
}

/// Enroll a platform credential and describe it as an authentication device
pub fn device_fixture(authenticator: &SoftwareAuthenticator, seed: u8, alias: &str) -> DeviceData {
    let credential = authenticator.enroll(&[seed; 32]);
    DeviceData::authenticator(
        alias,
        credential.public_key,
        credential.credential_id,
        KeyType::Platform,
        Purpose::Authentication,
    )
}

/// Create an anchor holding `count` devices enrolled on `effects`' authenticator
pub fn seed_anchor_with_devices(effects: &TestEffects, count: u8) -> (AnchorNumber, Vec<DeviceData>) {
    let devices: Vec<DeviceData> = (0..count)
        .map(|i| device_fixture(effects.authenticator(), i.wrapping_add(1), &format!("device {i}")))
        .collect();
    let anchor = effects.registry().seed_anchor(devices.clone());
    (anchor, devices)
}

/// Route `tracing` output to the test harness; `RUST_LOG` selects levels
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_anchor_devices_are_distinct() {
        let effects = TestEffects::new(1);
        let (anchor, devices) = seed_anchor_with_devices(&effects, 3);
        assert_eq!(effects.registry().devices(anchor), devices);
        assert_ne!(devices[0].public_key, devices[1].public_key);
        assert_eq!(effects.authenticator().credential_count(), 3);
        test_config().validate().unwrap();
    }
}
