//! Registration against the in-memory registry

#![allow(clippy::unwrap_used)]

use anchor_core::{AnchorError, AnchorNumber};
use anchor_identity::{
    IdentityContext, RegistrationFlow, RegistrationOutcome, RegistrationState, Session,
};
use anchor_testkit::{init_test_tracing, test_config, TestEffects, FIRST_ANCHOR};
use assert_matches::assert_matches;
use std::sync::Arc;

fn setup(max_attempts: u32) -> (Arc<TestEffects>, IdentityContext<TestEffects>) {
    init_test_tracing();
    let mut config = test_config();
    config.registration.max_captcha_attempts = max_attempts;
    let effects = Arc::new(TestEffects::with_config(1, &config).unwrap());
    let ctx = IdentityContext::new(Arc::clone(&effects), config).unwrap();
    (effects, ctx)
}

#[tokio::test]
async fn test_register_then_login() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx.clone());

    let challenge = flow.start("laptop").await.unwrap();
    assert_matches!(flow.state(), RegistrationState::CaptchaPending { .. });
    let answer = effects
        .registry()
        .captcha_answer(&challenge.challenge_key)
        .unwrap();

    let outcome = flow.submit_solution(&answer).await.unwrap();
    let anchor = AnchorNumber(FIRST_ANCHOR);
    assert_eq!(outcome, RegistrationOutcome::Registered(anchor));
    assert_eq!(flow.state(), &RegistrationState::Registered { anchor });

    let devices = effects.registry().devices(anchor);
    assert_eq!(devices.len(), 1);
    assert_eq!(Some(&devices[0]), flow.device());

    let session = Session::login(&ctx, anchor).await.unwrap();
    assert_eq!(session.device_public_key(), &devices[0].public_key);
    assert!(session.needs_recovery_mechanism());
}

#[tokio::test]
async fn test_wrong_answer_gets_fresh_single_use_challenge() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx);

    let first = flow.start("laptop").await.unwrap();
    let outcome = flow.submit_solution("definitely wrong").await.unwrap();
    let RegistrationOutcome::Retry(second) = outcome else {
        panic!("expected a new challenge, got {outcome:?}");
    };
    assert_ne!(first.challenge_key, second.challenge_key);
    // the first key was consumed by the wrong answer
    assert_eq!(effects.registry().captcha_answer(&first.challenge_key), None);

    let answer = effects
        .registry()
        .captcha_answer(&second.challenge_key)
        .unwrap();
    assert_matches!(
        flow.submit_solution(&answer).await.unwrap(),
        RegistrationOutcome::Registered(_)
    );
    assert_eq!(effects.registry().anchor_count(), 1);
}

#[tokio::test]
async fn test_attempts_exhausted() {
    let (effects, ctx) = setup(2);
    let mut flow = RegistrationFlow::new(ctx);

    flow.start("laptop").await.unwrap();
    assert_matches!(
        flow.submit_solution("nope").await.unwrap(),
        RegistrationOutcome::Retry(_)
    );
    assert_matches!(
        flow.submit_solution("nope").await,
        Err(AnchorError::ValidationFailed { .. })
    );
    assert_matches!(flow.state(), RegistrationState::Failed { .. });
    assert_eq!(effects.registry().anchor_count(), 0);
}

#[tokio::test]
async fn test_full_registry_is_terminal() {
    let (effects, ctx) = setup(5);
    effects.registry().set_capacity(0);
    let mut flow = RegistrationFlow::new(ctx);

    let challenge = flow.start("laptop").await.unwrap();
    let answer = effects
        .registry()
        .captcha_answer(&challenge.challenge_key)
        .unwrap();
    assert_eq!(
        flow.submit_solution(&answer).await,
        Err(AnchorError::CapacityExhausted)
    );
    let ceremonies = effects.authenticator().ceremony_count();
    let credentials = effects.authenticator().credential_count();
    assert_eq!(flow.start("laptop").await, Err(AnchorError::CapacityExhausted));
    // a permanent failure is refused before any authenticator prompt
    assert_eq!(effects.authenticator().ceremony_count(), ceremonies);
    assert_eq!(effects.authenticator().credential_count(), credentials);
    assert_matches!(
        flow.state(),
        RegistrationState::Failed {
            error: AnchorError::CapacityExhausted
        }
    );
}

#[tokio::test]
async fn test_clock_failure_on_refresh_ends_the_attempt() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx);

    flow.start("laptop").await.unwrap();
    effects.clock().fail_next_reading();
    assert_matches!(
        flow.submit_solution("wrong").await,
        Err(AnchorError::Internal { .. })
    );
    assert_matches!(flow.state(), RegistrationState::Failed { .. });

    // the failure is retriable, so a fresh start goes through
    let challenge = flow.start("laptop").await.unwrap();
    let answer = effects
        .registry()
        .captcha_answer(&challenge.challenge_key)
        .unwrap();
    assert_matches!(
        flow.submit_solution(&answer).await.unwrap(),
        RegistrationOutcome::Registered(_)
    );
}

#[tokio::test]
async fn test_unreachable_registry_can_be_retried() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx);

    effects.registry().set_offline(true);
    assert_matches!(
        flow.start("laptop").await,
        Err(AnchorError::Transport { .. })
    );
    assert_matches!(flow.state(), RegistrationState::Failed { .. });

    effects.registry().set_offline(false);
    let challenge = flow.start("laptop").await.unwrap();
    assert!(effects
        .registry()
        .captcha_answer(&challenge.challenge_key)
        .is_some());
}

#[tokio::test]
async fn test_cancel_registers_nothing() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx);

    flow.start("laptop").await.unwrap();
    flow.cancel().unwrap();
    assert_eq!(flow.state(), &RegistrationState::Idle);
    assert!(flow.device().is_none());
    assert_eq!(
        flow.submit_solution("abc").await,
        Err(AnchorError::UserCancelled)
    );
    assert_eq!(effects.registry().anchor_count(), 0);
}

#[tokio::test]
async fn test_user_cancels_credential_creation() {
    let (effects, ctx) = setup(5);
    let mut flow = RegistrationFlow::new(ctx);

    effects.authenticator().cancel_next();
    assert_eq!(flow.start("laptop").await, Err(AnchorError::UserCancelled));
    assert_eq!(flow.state(), &RegistrationState::Idle);
    assert_eq!(effects.registry().calls().total, 0);
}
