//! Anchor registration behind proof-of-work and CAPTCHA
//!
//! ```text
//! Idle ─Start─▶ ComputingProofOfWork ─ProofOfWorkSolved─▶ AwaitingCaptcha
//!   ▲                                                        │ ChallengeIssued
//!   │ Cancel                                                 ▼
//!   └──────────────── (any non-terminal) ◀──────────── CaptchaPending(key)
//!                                                            │ SolutionSubmitted
//!                                                            ▼
//!        AwaitingCaptcha ◀─BadChallenge── Confirmed(key) ─Registered─▶ Registered(anchor)
//!                                             │ CanisterFull
//!                                             ▼
//!                                          Failed
//! ```
//!
//! A wrong CAPTCHA answer burns its challenge key: the flow goes back to
//! `AwaitingCaptcha` and a new proof of work buys a new CAPTCHA. After
//! `max_captcha_attempts` wrong answers the flow fails with a validation error.
//! `Failed` with a retriable error may be restarted; `CapacityExhausted` may not.

use crate::context::{CancelHandle, IdentityContext, IdentityEffects};
use crate::flow::Transition;
use anchor_core::effects::CredentialCreation;
use anchor_core::{
    AnchorError, AnchorNumber, AnchorResult, Challenge, ChallengeResult, DeviceData, ProofOfWork,
    Purpose, RegisterResponse,
};

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Registration flow states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    /// Nothing in flight
    Idle,
    /// Searching for a proof of work for `timestamp_ms`
    ComputingProofOfWork {
        /// Timestamp the proof is computed for
        timestamp_ms: u64,
        /// Wrong CAPTCHA answers so far
        attempts: u32,
    },
    /// Proof submitted, waiting for a CAPTCHA
    AwaitingCaptcha {
        /// Wrong CAPTCHA answers so far
        attempts: u32,
    },
    /// CAPTCHA displayed, waiting for the user's answer
    CaptchaPending {
        /// Single-use key of the displayed CAPTCHA
        challenge_key: String,
        /// Wrong CAPTCHA answers so far
        attempts: u32,
    },
    /// Answer submitted, waiting for the registry
    Confirmed {
        /// Key the answer was submitted against
        challenge_key: String,
        /// Answers submitted so far, including this one
        attempts: u32,
    },
    /// Anchor created
    Registered {
        /// The new anchor
        anchor: AnchorNumber,
    },
    /// Flow ended with an error
    Failed {
        /// Why the flow failed
        error: AnchorError,
    },
}

impl RegistrationState {
    /// Whether the flow has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Registered { .. } | Self::Failed { .. })
    }

    /// Whether a new `Start` would be accepted
    ///
    /// A failure the registry reports as permanent cannot be restarted.
    pub fn check_startable(&self) -> AnchorResult<()> {
        match self {
            Self::Idle => Ok(()),
            Self::Failed { error } if error.is_retriable() => Ok(()),
            Self::Failed { error } => Err(error.clone()),
            _ => Err(AnchorError::invalid("a registration is already in flight")),
        }
    }
}

/// Inputs to the registration state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// Begin registration with a proof for `timestamp_ms`
    Start {
        /// Client timestamp for the proof of work
        timestamp_ms: u64,
    },
    /// Proof of work found
    ProofOfWorkSolved(ProofOfWork),
    /// Registry issued a CAPTCHA
    ChallengeIssued {
        /// Single-use key of the CAPTCHA
        challenge_key: String,
    },
    /// User answered the CAPTCHA
    SolutionSubmitted {
        /// Entered characters
        chars: String,
    },
    /// Registry answered the registration request
    RegistryResponded(RegisterResponse),
    /// A step failed
    Failure(AnchorError),
    /// User cancelled
    Cancel,
}

/// Work the driver performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEffect {
    /// Search for a proof of work
    SolveProofOfWork {
        /// Timestamp to compute the proof for
        timestamp_ms: u64,
    },
    /// Exchange the proof for a CAPTCHA
    RequestChallenge {
        /// Solved proof
        pow: ProofOfWork,
    },
    /// Show the CAPTCHA to the user
    DisplayCaptcha {
        /// Key of the displayed CAPTCHA
        challenge_key: String,
    },
    /// Submit the registration with the answer
    SubmitRegistration {
        /// Answer and key
        challenge: ChallengeResult,
    },
    /// The previous CAPTCHA is burnt; obtain a new proof and CAPTCHA
    RefreshChallenge,
    /// Registration succeeded
    Completed {
        /// The new anchor
        anchor: AnchorNumber,
    },
    /// Registration failed
    Abort {
        /// Why
        error: AnchorError,
    },
}

/// Pure transition function of the registration flow
pub fn transition(
    state: &RegistrationState,
    event: RegistrationEvent,
    max_attempts: u32,
) -> AnchorResult<Transition<RegistrationState, RegistrationEffect>> {
    use RegistrationEffect as Fx;
    use RegistrationEvent as Ev;
    use RegistrationState as St;

    let next = match (state, event) {
        (St::Idle, Ev::Start { timestamp_ms }) => Transition::to(
            St::ComputingProofOfWork {
                timestamp_ms,
                attempts: 0,
            },
            vec![Fx::SolveProofOfWork { timestamp_ms }],
        ),
        (St::Failed { .. }, Ev::Start { timestamp_ms }) => {
            state.check_startable()?;
            Transition::to(
                St::ComputingProofOfWork {
                    timestamp_ms,
                    attempts: 0,
                },
                vec![Fx::SolveProofOfWork { timestamp_ms }],
            )
        }
        (St::ComputingProofOfWork { attempts, .. }, Ev::ProofOfWorkSolved(pow)) => Transition::to(
            St::AwaitingCaptcha {
                attempts: *attempts,
            },
            vec![Fx::RequestChallenge { pow }],
        ),
        (St::AwaitingCaptcha { attempts }, Ev::ProofOfWorkSolved(pow)) => Transition::to(
            St::AwaitingCaptcha {
                attempts: *attempts,
            },
            vec![Fx::RequestChallenge { pow }],
        ),
        (St::AwaitingCaptcha { attempts }, Ev::ChallengeIssued { challenge_key }) => {
            Transition::to(
                St::CaptchaPending {
                    challenge_key: challenge_key.clone(),
                    attempts: *attempts,
                },
                vec![Fx::DisplayCaptcha { challenge_key }],
            )
        }
        (
            St::CaptchaPending {
                challenge_key,
                attempts,
            },
            Ev::SolutionSubmitted { chars },
        ) => Transition::to(
            St::Confirmed {
                challenge_key: challenge_key.clone(),
                attempts: attempts + 1,
            },
            vec![Fx::SubmitRegistration {
                challenge: ChallengeResult {
                    key: challenge_key.clone(),
                    chars,
                },
            }],
        ),
        (St::Confirmed { .. }, Ev::RegistryResponded(RegisterResponse::Registered { anchor })) => {
            Transition::to(St::Registered { anchor }, vec![Fx::Completed { anchor }])
        }
        (St::Confirmed { attempts, .. }, Ev::RegistryResponded(RegisterResponse::BadChallenge)) => {
            if *attempts >= max_attempts {
                let error = AnchorError::validation(format!(
                    "CAPTCHA answered incorrectly {attempts} times"
                ));
                Transition::to(
                    St::Failed {
                        error: error.clone(),
                    },
                    vec![Fx::Abort { error }],
                )
            } else {
                Transition::to(
                    St::AwaitingCaptcha {
                        attempts: *attempts,
                    },
                    vec![Fx::RefreshChallenge],
                )
            }
        }
        (St::Confirmed { .. }, Ev::RegistryResponded(RegisterResponse::CanisterFull)) => {
            let error = AnchorError::CapacityExhausted;
            Transition::to(
                St::Failed {
                    error: error.clone(),
                },
                vec![Fx::Abort { error }],
            )
        }
        (current, Ev::Failure(error)) if !current.is_terminal() && *current != St::Idle => {
            Transition::to(
                St::Failed {
                    error: error.clone(),
                },
                vec![Fx::Abort { error }],
            )
        }
        (St::Registered { .. }, Ev::Cancel) => {
            return Err(AnchorError::invalid("registration already completed"))
        }
        (_, Ev::Cancel) => Transition::quiet(St::Idle),
        (current, event) => {
            return Err(AnchorError::invalid(format!(
                "registration event {event:?} not valid in state {current:?}"
            )))
        }
    };
    Ok(next)
}

// =============================================================================
// DRIVER
// =============================================================================

/// What a CAPTCHA submission led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The anchor exists and owns the new device
    Registered(AnchorNumber),
    /// The answer was wrong; here is a new CAPTCHA
    Retry(Challenge),
}

/// Drives the registration state machine against the effects
pub struct RegistrationFlow<E: IdentityEffects> {
    ctx: IdentityContext<E>,
    state: RegistrationState,
    device: Option<DeviceData>,
    cancel: CancelHandle,
}

impl<E: IdentityEffects> RegistrationFlow<E> {
    /// Create an idle flow
    pub fn new(ctx: IdentityContext<E>) -> Self {
        Self {
            ctx,
            state: RegistrationState::Idle,
            device: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    /// Handle that cancels the flow at its next step
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Device that will become the anchor's first device
    pub fn device(&self) -> Option<&DeviceData> {
        self.device.as_ref()
    }

    /// Create the first credential, solve a proof of work, and fetch a CAPTCHA
    pub async fn start(&mut self, alias: &str) -> AnchorResult<Challenge> {
        self.state.check_startable()?;
        self.cancel = CancelHandle::new();

        let credential = {
            let _ceremony = self.ctx.gate().begin("create credential")?;
            let user_handle = self.ctx.effects().random_bytes(16).await;
            self.ctx
                .effects()
                .create_credential(CredentialCreation {
                    display_name: alias.to_string(),
                    user_handle,
                    exclude_credentials: Vec::new(),
                    attachment: None,
                })
                .await?
        };
        let device = DeviceData::authenticator(
            alias,
            credential.public_key,
            credential.credential_id,
            credential.key_type,
            Purpose::Authentication,
        );
        device.validate()?;
        self.device = Some(device);

        let timestamp_ms = self.ctx.effects().now_ms().await?;
        self.apply(RegistrationEvent::Start { timestamp_ms })?;
        tracing::info!(alias, "registration started");
        self.obtain_challenge().await
    }

    /// Submit the user's CAPTCHA answer
    pub async fn submit_solution(&mut self, chars: &str) -> AnchorResult<RegistrationOutcome> {
        self.check_cancelled()?;
        let device = self
            .device
            .clone()
            .ok_or_else(|| AnchorError::invalid("registration not started"))?;

        let effects = self.apply(RegistrationEvent::SolutionSubmitted {
            chars: chars.to_string(),
        })?;
        let challenge = effects
            .into_iter()
            .find_map(|fx| match fx {
                RegistrationEffect::SubmitRegistration { challenge } => Some(challenge),
                _ => None,
            })
            .ok_or_else(|| AnchorError::internal("submission emitted no registration"))?;

        let response = match self.ctx.effects().register(device, challenge).await {
            Ok(response) => response,
            Err(error) => return Err(self.fail(error)),
        };
        tracing::debug!(?response, "registry answered registration");

        for fx in self.apply(RegistrationEvent::RegistryResponded(response))? {
            match fx {
                RegistrationEffect::Completed { anchor } => {
                    tracing::info!(%anchor, "registered new identity anchor");
                    return Ok(RegistrationOutcome::Registered(anchor));
                }
                RegistrationEffect::RefreshChallenge => {
                    tracing::info!("incorrect CAPTCHA answer; requesting a new challenge");
                    let timestamp_ms = match self.ctx.effects().now_ms().await {
                        Ok(now) => now,
                        Err(error) => return Err(self.fail(error)),
                    };
                    let pow = self.solve(timestamp_ms).await?;
                    self.apply(RegistrationEvent::ProofOfWorkSolved(pow))?;
                    let challenge = self.request_challenge(pow).await?;
                    return Ok(RegistrationOutcome::Retry(challenge));
                }
                RegistrationEffect::Abort { error } => return Err(error),
                _ => {}
            }
        }
        Err(AnchorError::internal("registry response produced no outcome"))
    }

    /// Abandon the flow; nothing has been registered before `Registered`
    pub fn cancel(&mut self) -> AnchorResult<()> {
        self.cancel.cancel();
        self.apply(RegistrationEvent::Cancel)?;
        self.device = None;
        tracing::info!("registration cancelled");
        Ok(())
    }

    async fn obtain_challenge(&mut self) -> AnchorResult<Challenge> {
        let RegistrationState::ComputingProofOfWork { timestamp_ms, .. } = self.state else {
            return Err(AnchorError::internal("not computing a proof of work"));
        };
        let pow = self.solve(timestamp_ms).await?;
        self.apply(RegistrationEvent::ProofOfWorkSolved(pow))?;
        self.request_challenge(pow).await
    }

    async fn solve(&mut self, timestamp_ms: u64) -> AnchorResult<ProofOfWork> {
        self.check_cancelled()?;
        match crate::pow::compute_proof_of_work_at(&self.ctx, timestamp_ms).await {
            Ok(pow) => Ok(pow),
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn request_challenge(&mut self, pow: ProofOfWork) -> AnchorResult<Challenge> {
        self.check_cancelled()?;
        let challenge = match self.ctx.effects().create_challenge(pow).await {
            Ok(challenge) => challenge,
            Err(error) => return Err(self.fail(error)),
        };
        self.apply(RegistrationEvent::ChallengeIssued {
            challenge_key: challenge.challenge_key.clone(),
        })?;
        Ok(challenge)
    }

    fn apply(&mut self, event: RegistrationEvent) -> AnchorResult<Vec<RegistrationEffect>> {
        let max_attempts = self.ctx.config().registration.max_captcha_attempts;
        let Transition { state, effects } = transition(&self.state, event, max_attempts)?;
        tracing::debug!(from = ?self.state, to = ?state, "registration transition");
        self.state = state;
        Ok(effects)
    }

    fn fail(&mut self, error: AnchorError) -> AnchorError {
        if let Err(e) = self.apply(RegistrationEvent::Failure(error.clone())) {
            tracing::warn!(error = %e, "could not record registration failure");
        }
        error
    }

    fn check_cancelled(&mut self) -> AnchorResult<()> {
        if self.cancel.is_cancelled() {
            if !matches!(self.state, RegistrationState::Idle) && !self.state.is_terminal() {
                self.state = RegistrationState::Idle;
            }
            return Err(AnchorError::UserCancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn pow() -> ProofOfWork {
        ProofOfWork {
            timestamp_ms: 1,
            nonce: 2,
        }
    }

    fn at_confirmed(attempts: u32) -> RegistrationState {
        RegistrationState::Confirmed {
            challenge_key: "k".to_string(),
            attempts,
        }
    }

    #[test]
    fn test_happy_path() {
        let t = transition(
            &RegistrationState::Idle,
            RegistrationEvent::Start { timestamp_ms: 1 },
            5,
        )
        .unwrap();
        assert_eq!(
            t.effects,
            vec![RegistrationEffect::SolveProofOfWork { timestamp_ms: 1 }]
        );

        let t = transition(&t.state, RegistrationEvent::ProofOfWorkSolved(pow()), 5).unwrap();
        assert_eq!(t.state, RegistrationState::AwaitingCaptcha { attempts: 0 });

        let t = transition(
            &t.state,
            RegistrationEvent::ChallengeIssued {
                challenge_key: "k".to_string(),
            },
            5,
        )
        .unwrap();
        assert_matches!(t.state, RegistrationState::CaptchaPending { .. });

        let t = transition(
            &t.state,
            RegistrationEvent::SolutionSubmitted {
                chars: "abc".to_string(),
            },
            5,
        )
        .unwrap();
        assert_eq!(t.state, at_confirmed(1));
        assert_eq!(
            t.effects,
            vec![RegistrationEffect::SubmitRegistration {
                challenge: ChallengeResult {
                    key: "k".to_string(),
                    chars: "abc".to_string()
                }
            }]
        );

        let t = transition(
            &t.state,
            RegistrationEvent::RegistryResponded(RegisterResponse::Registered {
                anchor: AnchorNumber(10_000),
            }),
            5,
        )
        .unwrap();
        assert_eq!(
            t.state,
            RegistrationState::Registered {
                anchor: AnchorNumber(10_000)
            }
        );
    }

    #[test]
    fn test_wrong_answer_returns_to_awaiting_captcha() {
        let t = transition(
            &at_confirmed(1),
            RegistrationEvent::RegistryResponded(RegisterResponse::BadChallenge),
            5,
        )
        .unwrap();
        assert_eq!(t.state, RegistrationState::AwaitingCaptcha { attempts: 1 });
        assert_eq!(t.effects, vec![RegistrationEffect::RefreshChallenge]);
    }

    #[test]
    fn test_attempts_exhausted() {
        let t = transition(
            &at_confirmed(3),
            RegistrationEvent::RegistryResponded(RegisterResponse::BadChallenge),
            3,
        )
        .unwrap();
        assert_matches!(
            t.state,
            RegistrationState::Failed {
                error: AnchorError::ValidationFailed { .. }
            }
        );
    }

    #[test]
    fn test_capacity_is_terminal() {
        let t = transition(
            &at_confirmed(1),
            RegistrationEvent::RegistryResponded(RegisterResponse::CanisterFull),
            5,
        )
        .unwrap();
        assert_eq!(
            t.state,
            RegistrationState::Failed {
                error: AnchorError::CapacityExhausted
            }
        );
        assert_eq!(
            transition(&t.state, RegistrationEvent::Start { timestamp_ms: 2 }, 5),
            Err(AnchorError::CapacityExhausted)
        );
    }

    #[test]
    fn test_retriable_failure_restarts() {
        let failed = RegistrationState::Failed {
            error: AnchorError::transport("down"),
        };
        let t = transition(&failed, RegistrationEvent::Start { timestamp_ms: 9 }, 5).unwrap();
        assert_matches!(t.state, RegistrationState::ComputingProofOfWork { timestamp_ms: 9, .. });
    }

    #[test]
    fn test_startable_states() {
        assert_eq!(RegistrationState::Idle.check_startable(), Ok(()));
        let full = RegistrationState::Failed {
            error: AnchorError::CapacityExhausted,
        };
        assert_eq!(full.check_startable(), Err(AnchorError::CapacityExhausted));
        assert_matches!(
            RegistrationState::AwaitingCaptcha { attempts: 0 }.check_startable(),
            Err(AnchorError::Invalid { .. })
        );
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let pending = RegistrationState::CaptchaPending {
            challenge_key: "k".to_string(),
            attempts: 2,
        };
        let t = transition(&pending, RegistrationEvent::Cancel, 5).unwrap();
        assert_eq!(t.state, RegistrationState::Idle);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_out_of_order_events_rejected() {
        assert!(transition(
            &RegistrationState::Idle,
            RegistrationEvent::SolutionSubmitted {
                chars: "x".to_string()
            },
            5
        )
        .is_err());
        assert!(transition(
            &RegistrationState::AwaitingCaptcha { attempts: 0 },
            RegistrationEvent::RegistryResponded(RegisterResponse::BadChallenge),
            5
        )
        .is_err());
    }
}
