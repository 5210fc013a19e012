//! Device add/remove/replace rules

#![allow(clippy::unwrap_used)]

use anchor_core::{AnchorError, AnchorNumber, DeviceData, Protection, PublicKey};
use anchor_identity::{
    lookup_authentication_devices, lookup_recovery_devices, DeviceManager, IdentityContext,
    Session, SessionState,
};
use anchor_testkit::{
    device_fixture, init_test_tracing, seed_anchor_with_devices, test_config, TestEffects,
};
use assert_matches::assert_matches;
use proptest::prelude::*;
use std::sync::Arc;

struct Fixture {
    effects: Arc<TestEffects>,
    ctx: IdentityContext<TestEffects>,
    anchor: AnchorNumber,
    devices: Vec<DeviceData>,
}

fn setup(count: u8) -> Fixture {
    init_test_tracing();
    let effects = Arc::new(TestEffects::new(5));
    let (anchor, devices) = seed_anchor_with_devices(&effects, count);
    let ctx = IdentityContext::new(Arc::clone(&effects), test_config()).unwrap();
    Fixture {
        effects,
        ctx,
        anchor,
        devices,
    }
}

async fn login_as(f: &Fixture, index: usize) -> Session<TestEffects> {
    f.effects
        .authenticator()
        .select_credential(f.devices[index].credential_id.clone());
    let session = Session::login(&f.ctx, f.anchor).await.unwrap();
    f.effects.authenticator().select_credential(None);
    session
}

fn mutations(f: &Fixture) -> u64 {
    f.effects.registry().calls().mutations
}

#[tokio::test]
async fn test_add_device_refreshes_snapshot() {
    let f = setup(1);
    let mut session = login_as(&f, 0).await;
    let tablet = device_fixture(f.effects.authenticator(), 50, "tablet");

    DeviceManager::new(&mut session)
        .add_device(tablet.clone())
        .await
        .unwrap();
    assert!(session.snapshot().contains(&tablet.public_key));
    assert_eq!(f.effects.registry().devices(f.anchor).len(), 2);
}

#[tokio::test]
async fn test_rejected_adds_never_reach_registry() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    let before = mutations(&f);
    let mut manager = DeviceManager::new(&mut session);

    assert_matches!(
        manager.add_device(f.devices[1].clone()).await,
        Err(AnchorError::Invalid { .. })
    );

    let mut same_credential = device_fixture(f.effects.authenticator(), 60, "copy");
    same_credential.credential_id = f.devices[1].credential_id.clone();
    assert_matches!(
        manager.add_device(same_credential).await,
        Err(AnchorError::Invalid { .. })
    );

    let mut unnamed = device_fixture(f.effects.authenticator(), 61, "x");
    unnamed.alias = "  ".to_string();
    assert_matches!(
        manager.add_device(unnamed).await,
        Err(AnchorError::Invalid { .. })
    );

    assert_eq!(mutations(&f), before);
}

#[tokio::test]
async fn test_last_device_is_kept() {
    let f = setup(1);
    let mut session = login_as(&f, 0).await;
    let before = f.effects.registry().calls();

    assert_eq!(
        DeviceManager::new(&mut session)
            .remove_device(&f.devices[0].public_key)
            .await,
        Err(AnchorError::LastDeviceRemoval)
    );
    assert_eq!(f.effects.registry().calls(), before);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_removing_own_device_logs_out() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;

    DeviceManager::new(&mut session)
        .remove_device(&f.devices[0].public_key)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert_eq!(session.delegation().await, Err(AnchorError::SessionExpired));
    assert_eq!(session.snapshot().devices, vec![f.devices[1].clone()]);
    assert_eq!(f.effects.registry().devices(f.anchor), vec![f.devices[1].clone()]);
}

#[tokio::test]
async fn test_removing_other_device_keeps_session() {
    let f = setup(3);
    let mut session = login_as(&f, 0).await;

    DeviceManager::new(&mut session)
        .remove_device(&f.devices[2].public_key)
        .await
        .unwrap();
    assert!(session.is_active());
    assert_eq!(session.snapshot().devices.len(), 2);

    assert_matches!(
        DeviceManager::new(&mut session)
            .remove_device(&f.devices[2].public_key)
            .await,
        Err(AnchorError::NotFound { .. })
    );
}

#[tokio::test]
async fn test_replace_device() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    let replacement = device_fixture(f.effects.authenticator(), 70, "new laptop");

    assert_matches!(
        DeviceManager::new(&mut session)
            .replace_device(&PublicKey::from_bytes(vec![1, 2, 3]), replacement.clone())
            .await,
        Err(AnchorError::NotFound { .. })
    );
    assert_matches!(
        DeviceManager::new(&mut session)
            .replace_device(&f.devices[1].public_key, f.devices[0].clone())
            .await,
        Err(AnchorError::Invalid { .. })
    );

    DeviceManager::new(&mut session)
        .replace_device(&f.devices[1].public_key, replacement.clone())
        .await
        .unwrap();
    assert!(session.is_active());
    assert_eq!(
        f.effects.registry().devices(f.anchor),
        vec![f.devices[0].clone(), replacement.clone()]
    );

    // replacing the login device ends the session
    let successor = device_fixture(f.effects.authenticator(), 71, "successor");
    DeviceManager::new(&mut session)
        .replace_device(&f.devices[0].public_key, successor)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::LoggedOut);
}

#[tokio::test]
async fn test_protected_device_only_changes_itself() {
    init_test_tracing();
    let effects = Arc::new(TestEffects::new(6));
    let mut devices = vec![
        device_fixture(effects.authenticator(), 1, "phone"),
        device_fixture(effects.authenticator(), 2, "vault key"),
    ];
    devices[1].protection = Protection::Protected;
    let anchor = effects.registry().seed_anchor(devices.clone());
    let ctx = IdentityContext::new(Arc::clone(&effects), test_config()).unwrap();

    effects
        .authenticator()
        .select_credential(devices[0].credential_id.clone());
    let mut session = Session::login(&ctx, anchor).await.unwrap();
    let before = effects.registry().calls().mutations;
    assert_matches!(
        DeviceManager::new(&mut session)
            .remove_device(&devices[1].public_key)
            .await,
        Err(AnchorError::PermissionDenied { .. })
    );
    let replacement = device_fixture(effects.authenticator(), 3, "new key");
    assert_matches!(
        DeviceManager::new(&mut session)
            .replace_device(&devices[1].public_key, replacement)
            .await,
        Err(AnchorError::PermissionDenied { .. })
    );
    // refused before anything is sent
    assert_eq!(effects.registry().calls().mutations, before);
    assert_eq!(effects.registry().devices(anchor).len(), 2);
}

#[tokio::test]
async fn test_failed_refresh_after_removal_keeps_local_view() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;

    f.effects.registry().drop_next_lookups(1);
    DeviceManager::new(&mut session)
        .remove_device(&f.devices[1].public_key)
        .await
        .unwrap();
    assert!(session.is_active());
    assert_eq!(session.snapshot().devices, vec![f.devices[0].clone()]);

    // a stale two-device view would let the last device go
    let before = f.effects.registry().calls();
    assert_eq!(
        DeviceManager::new(&mut session)
            .remove_device(&f.devices[0].public_key)
            .await,
        Err(AnchorError::LastDeviceRemoval)
    );
    assert_eq!(f.effects.registry().calls(), before);
    assert_eq!(f.effects.registry().devices(f.anchor), vec![f.devices[0].clone()]);
}

#[tokio::test]
async fn test_failed_refresh_after_replacement_keeps_local_view() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    let replacement = device_fixture(f.effects.authenticator(), 80, "replacement");

    f.effects.registry().drop_next_lookups(1);
    DeviceManager::new(&mut session)
        .replace_device(&f.devices[1].public_key, replacement.clone())
        .await
        .unwrap();
    assert_eq!(
        session.snapshot().devices,
        vec![f.devices[0].clone(), replacement.clone()]
    );
    assert_eq!(
        f.effects.registry().devices(f.anchor),
        session.snapshot().devices
    );
}

#[tokio::test]
async fn test_replacing_login_device_with_same_key_keeps_session() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    let mut renamed = f.devices[0].clone();
    renamed.alias = "renamed laptop".to_string();

    DeviceManager::new(&mut session)
        .replace_device(&f.devices[0].public_key, renamed.clone())
        .await
        .unwrap();
    assert!(session.is_active());
    assert!(session.delegation().await.is_ok());
    assert_eq!(session.snapshot().devices[0], renamed);
}

#[tokio::test]
async fn test_expired_session_cannot_mutate() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    f.effects.clock().advance(test_config().delegation.session_ttl_ms);
    let before = mutations(&f);

    assert_eq!(
        DeviceManager::new(&mut session)
            .remove_device(&f.devices[1].public_key)
            .await,
        Err(AnchorError::SessionExpired)
    );
    assert_eq!(mutations(&f), before);
}

#[tokio::test]
async fn test_lookup_helpers_split_by_purpose() {
    let f = setup(2);
    let mut session = login_as(&f, 0).await;
    assert!(session.needs_recovery_mechanism());

    let phrase = anchor_identity::RecoverySetup::new(&mut session)
        .setup_recovery_phrase()
        .await
        .unwrap();
    assert_eq!(phrase.anchor(), Some(f.anchor));
    assert!(!session.needs_recovery_mechanism());

    let registry = f.effects.registry();
    assert_eq!(
        lookup_authentication_devices(registry, f.anchor).await.unwrap(),
        f.devices
    );
    let recovery = lookup_recovery_devices(registry, f.anchor).await.unwrap();
    assert_eq!(recovery.len(), 1);
    assert!(recovery[0].credential_id.is_none());
    assert!(lookup_recovery_devices(registry, AnchorNumber(1))
        .await
        .unwrap()
        .is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn removal_always_leaves_one_device(count in 1u8..6) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let f = setup(count);
            let mut session = login_as(&f, 0).await;

            for device in f.devices.iter().skip(1) {
                DeviceManager::new(&mut session)
                    .remove_device(&device.public_key)
                    .await
                    .unwrap();
            }
            let before = f.effects.registry().calls();
            assert_eq!(
                DeviceManager::new(&mut session)
                    .remove_device(&f.devices[0].public_key)
                    .await,
                Err(AnchorError::LastDeviceRemoval)
            );
            assert_eq!(f.effects.registry().calls(), before);
            assert_eq!(f.effects.registry().devices(f.anchor), vec![f.devices[0].clone()]);
        });
    }
}
