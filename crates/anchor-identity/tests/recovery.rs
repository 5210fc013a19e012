//! Recovery phrase and recovery security key round trips

#![allow(clippy::unwrap_used)]

use anchor_core::{AnchorError, AnchorNumber, KeyType, Purpose};
use anchor_identity::{
    lookup_recovery_devices, DeviceManager, IdentityContext, RecoveryPhrase, RecoverySetup,
    Session,
};
use anchor_testkit::{
    device_fixture, init_test_tracing, seed_anchor_with_devices, test_config, TestEffects,
};
use assert_matches::assert_matches;
use std::sync::Arc;

fn setup() -> (Arc<TestEffects>, IdentityContext<TestEffects>, AnchorNumber) {
    init_test_tracing();
    let effects = Arc::new(TestEffects::new(8));
    let (anchor, _) = seed_anchor_with_devices(&effects, 1);
    let ctx = IdentityContext::new(Arc::clone(&effects), test_config()).unwrap();
    (effects, ctx, anchor)
}

#[tokio::test]
async fn test_phrase_setup_then_recover() {
    let (effects, ctx, anchor) = setup();
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    let phrase = RecoverySetup::new(&mut session)
        .setup_recovery_phrase()
        .await
        .unwrap();
    assert_eq!(phrase.word_count(), 24);
    assert!(phrase.has_valid_checksum());

    let displayed = phrase.to_string();
    assert!(displayed.starts_with(&format!("{anchor} ")));

    let recovered = Session::login_with_recovery_phrase(&ctx, anchor, &displayed)
        .await
        .unwrap();
    let registered = effects.registry().devices(anchor);
    let phrase_device = registered
        .iter()
        .find(|d| d.key_type == KeyType::SeedPhrase)
        .unwrap();
    assert_eq!(recovered.device_public_key(), &phrase_device.public_key);
    assert_eq!(phrase_device.purpose, Purpose::Recovery);

    // the phrase works without its anchor prefix and with sloppy spacing
    let loose = format!("  {}  ", phrase.mnemonic().replace(' ', "   "));
    Session::login_with_recovery_phrase(&ctx, anchor, &loose)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recovered_session_can_add_a_device() {
    let (effects, ctx, anchor) = setup();
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    let phrase = RecoverySetup::new(&mut session)
        .setup_recovery_phrase()
        .await
        .unwrap();

    let mut recovered = Session::login_with_recovery_phrase(&ctx, anchor, &phrase.to_string())
        .await
        .unwrap();
    let new_laptop = device_fixture(effects.authenticator(), 90, "new laptop");
    DeviceManager::new(&mut recovered)
        .add_device(new_laptop.clone())
        .await
        .unwrap();
    assert!(effects.registry().devices(anchor).contains(&new_laptop));
}

#[tokio::test]
async fn test_phrase_rejections() {
    let (_effects, ctx, anchor) = setup();
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    let phrase = RecoverySetup::new(&mut session)
        .setup_recovery_phrase()
        .await
        .unwrap();

    let wrong_anchor = format!("{} {}", anchor.value() + 1, phrase.mnemonic());
    assert_matches!(
        Session::login_with_recovery_phrase(&ctx, anchor, &wrong_anchor)
            .await
            .err(),
        Some(AnchorError::Invalid { .. })
    );

    let other = RecoveryPhrase::from_entropy(None, &[7u8; 32]).unwrap();
    assert_matches!(
        Session::login_with_recovery_phrase(&ctx, anchor, other.mnemonic())
            .await
            .err(),
        Some(AnchorError::AuthenticationFailed { .. })
    );

    assert_matches!(
        Session::login_with_recovery_phrase(&ctx, anchor, &anchor.to_string())
            .await
            .err(),
        Some(AnchorError::Invalid { .. })
    );
}

#[tokio::test]
async fn test_checksum_policy_applies_to_login() {
    let (effects, _ctx, anchor) = setup();
    let mut config = test_config();
    config.recovery.validate_checksum = true;
    let strict = IdentityContext::new(Arc::clone(&effects), config).unwrap();

    let typo = "abandon ".repeat(24);
    assert_matches!(
        Session::login_with_recovery_phrase(&strict, anchor, &typo)
            .await
            .err(),
        Some(AnchorError::ValidationFailed { .. })
    );
}

#[tokio::test]
async fn test_recovery_security_key() {
    let (effects, ctx, anchor) = setup();
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    let existing = session.snapshot().credential_ids();

    let key = RecoverySetup::new(&mut session)
        .setup_recovery_security_key("yubikey")
        .await
        .unwrap();
    assert_eq!(key.key_type, KeyType::CrossPlatform);
    assert_eq!(key.purpose, Purpose::Recovery);
    assert_eq!(effects.authenticator().last_excluded(), existing);
    assert!(!session.needs_recovery_mechanism());

    let recovery_devices = lookup_recovery_devices(effects.registry(), anchor)
        .await
        .unwrap();
    assert_eq!(recovery_devices, vec![key.clone()]);

    effects
        .authenticator()
        .select_credential(key.credential_id.clone());
    let recovered = Session::login_with_devices(&ctx, anchor, &recovery_devices)
        .await
        .unwrap();
    assert_eq!(recovered.device_public_key(), &key.public_key);
    assert_eq!(
        effects.authenticator().last_allowed(),
        vec![key.credential_id.clone().unwrap()]
    );
}

#[tokio::test]
async fn test_cancelled_security_key_setup_adds_nothing() {
    let (effects, ctx, anchor) = setup();
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    effects.authenticator().cancel_next();

    assert_eq!(
        RecoverySetup::new(&mut session)
            .setup_recovery_security_key("yubikey")
            .await,
        Err(AnchorError::UserCancelled)
    );
    assert_eq!(effects.registry().devices(anchor).len(), 1);
    assert!(session.needs_recovery_mechanism());
}
