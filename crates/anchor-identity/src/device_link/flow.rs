//! Device-link state machine
//!
//! Both sides of a link run the same states; which events apply depends on
//! the role.
//!
//! Origin (the new device, no session):
//!
//! ```text
//! LinkRequested ─TentativeRegistered─▶ LinkIssued ─Polled(absent)─▶ AwaitingRemoteConfirmation
//!                                          │                         │ Polled(absent) ⟲
//!                                          └──────Polled(present)────┴─▶ Confirmed
//!                                                   Polled(expired) ───▶ Expired
//! ```
//!
//! Confirming (a device with a session for the anchor):
//!
//! ```text
//! LinkIssued ─UserConfirmed─▶ AwaitingRemoteConfirmation ─CodeChecked(Verified)─▶ Confirmed
//!                                   ▲        │ CodeChecked(WrongCode n>0)
//!                                   │        ▼
//!                      CodeSubmitted └── WrongCode(n) ── CodeChecked(WrongCode 0 | Expired) ─▶ Expired
//! ```
//!
//! A code is only ever submitted after `UserConfirmed`; opening a link never
//! adds a device by itself.

use super::link::LinkPayload;
use crate::flow::Transition;
use anchor_core::{AnchorError, AnchorNumber, AnchorResult, VerifyTentativeResult};

/// Which side of the link a machine runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// The new device that issued the link
    Origin,
    /// The authenticated device that confirms it
    Confirming,
}

/// Device-link flow states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Origin is creating its credential for `anchor`
    LinkRequested {
        /// Anchor named by the user
        anchor: AnchorNumber,
    },
    /// A link for the candidate exists
    LinkIssued {
        /// Candidate device
        payload: LinkPayload,
    },
    /// Origin is polling, or the confirming side is exchanging the code
    AwaitingRemoteConfirmation {
        /// Candidate device
        payload: LinkPayload,
    },
    /// Last submitted code was wrong
    WrongCode {
        /// Candidate device
        payload: LinkPayload,
        /// Further attempts the registry will accept
        retries_left: u32,
    },
    /// The candidate is a registered device of the anchor
    Confirmed {
        /// Device that joined
        payload: LinkPayload,
    },
    /// The tentative registration lapsed or ran out of attempts
    Expired,
    /// Abandoned by the user
    Cancelled,
    /// Ended by an error
    Failed {
        /// Why
        error: AnchorError,
    },
}

impl LinkState {
    /// Whether the flow has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed { .. } | Self::Expired | Self::Cancelled | Self::Failed { .. }
        )
    }

    /// Candidate device, once known
    pub fn payload(&self) -> Option<&LinkPayload> {
        match self {
            Self::LinkIssued { payload }
            | Self::AwaitingRemoteConfirmation { payload }
            | Self::WrongCode { payload, .. }
            | Self::Confirmed { payload } => Some(payload),
            _ => None,
        }
    }
}

/// Inputs to the device-link machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Origin: the registry parked the candidate
    TentativeRegistered {
        /// Candidate device
        payload: LinkPayload,
    },
    /// Origin: one registry poll finished
    Polled {
        /// Candidate listed among the anchor's authentication devices
        present: bool,
        /// Tentative registration deadline passed
        expired: bool,
    },
    /// Confirming: the user explicitly approved the candidate
    UserConfirmed,
    /// Confirming: the user typed a verification code
    CodeSubmitted {
        /// Entered code
        code: String,
    },
    /// Confirming: the registry checked the code
    CodeChecked(VerifyTentativeResult),
    /// A step failed
    Failure(AnchorError),
    /// User cancelled or declined
    Cancel,
}

/// Work the driver performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEffect {
    /// Origin: show the link and verification code
    ShowLink {
        /// Candidate to encode
        payload: LinkPayload,
    },
    /// Origin: wait one interval and look the anchor's devices up again
    PollRegistry,
    /// Confirming: ask for the verification code
    PromptForCode,
    /// Confirming: send the code to the registry
    SubmitCode {
        /// Entered code
        code: String,
    },
    /// Origin: drop the link from the location it was carried in
    ClearLink,
    /// Origin: withdraw the tentative registration
    CancelTentative,
    /// Device joined the anchor
    Completed,
    /// Flow failed
    Abort {
        /// Why
        error: AnchorError,
    },
}

/// Pure transition function of the device-link flow
pub fn transition(
    state: &LinkState,
    event: LinkEvent,
    role: LinkRole,
) -> AnchorResult<Transition<LinkState, LinkEffect>> {
    use LinkEffect as Fx;
    use LinkEvent as Ev;
    use LinkRole::{Confirming, Origin};
    use LinkState as St;

    let next = match (state, event, role) {
        // ---- origin ----
        (St::LinkRequested { anchor }, Ev::TentativeRegistered { payload }, Origin) => {
            if payload.anchor != *anchor {
                return Err(AnchorError::invalid(format!(
                    "tentative device registered for {} instead of {anchor}",
                    payload.anchor
                )));
            }
            Transition::to(
                St::LinkIssued {
                    payload: payload.clone(),
                },
                vec![Fx::ShowLink { payload }, Fx::PollRegistry],
            )
        }
        (
            St::LinkIssued { payload } | St::AwaitingRemoteConfirmation { payload },
            Ev::Polled { present, expired },
            Origin,
        ) => {
            if present {
                Transition::to(
                    St::Confirmed {
                        payload: payload.clone(),
                    },
                    vec![Fx::ClearLink, Fx::Completed],
                )
            } else if expired {
                Transition::to(St::Expired, vec![Fx::ClearLink])
            } else {
                Transition::to(
                    St::AwaitingRemoteConfirmation {
                        payload: payload.clone(),
                    },
                    vec![Fx::PollRegistry],
                )
            }
        }

        // ---- confirming ----
        (St::LinkIssued { payload }, Ev::UserConfirmed, Confirming) => Transition::to(
            St::AwaitingRemoteConfirmation {
                payload: payload.clone(),
            },
            vec![Fx::PromptForCode],
        ),
        (
            St::AwaitingRemoteConfirmation { .. } | St::WrongCode { .. },
            Ev::CodeSubmitted { code },
            Confirming,
        ) => {
            let code = code.trim().to_string();
            if code.is_empty() {
                return Err(AnchorError::validation("verification code is empty"));
            }
            let payload = state
                .payload()
                .cloned()
                .ok_or_else(|| AnchorError::internal("link state lost its payload"))?;
            Transition::to(
                St::AwaitingRemoteConfirmation { payload },
                vec![Fx::SubmitCode { code }],
            )
        }
        (St::AwaitingRemoteConfirmation { payload }, Ev::CodeChecked(result), Confirming) => {
            match result {
                VerifyTentativeResult::Verified => Transition::to(
                    St::Confirmed {
                        payload: payload.clone(),
                    },
                    vec![Fx::Completed],
                ),
                VerifyTentativeResult::WrongCode { retries_left } if retries_left > 0 => {
                    Transition::to(
                        St::WrongCode {
                            payload: payload.clone(),
                            retries_left,
                        },
                        vec![Fx::PromptForCode],
                    )
                }
                VerifyTentativeResult::WrongCode { .. } | VerifyTentativeResult::Expired => {
                    Transition::quiet(St::Expired)
                }
            }
        }

        // ---- either side ----
        (current, Ev::Failure(error), _) if !current.is_terminal() => {
            let mut effects = Vec::new();
            if role == Origin {
                effects.push(Fx::ClearLink);
            }
            effects.push(Fx::Abort {
                error: error.clone(),
            });
            Transition::to(St::Failed { error }, effects)
        }
        (current, Ev::Cancel, _) if !current.is_terminal() => {
            let effects = match (role, current) {
                (Origin, St::LinkRequested { .. }) => vec![Fx::ClearLink],
                (Origin, _) => vec![Fx::CancelTentative, Fx::ClearLink],
                (Confirming, _) => Vec::new(),
            };
            Transition::to(St::Cancelled, effects)
        }
        (current, event, role) => {
            return Err(AnchorError::invalid(format!(
                "link event {event:?} not valid for {role:?} in state {current:?}"
            )))
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::{CredentialId, PublicKey};
    use assert_matches::assert_matches;

    fn payload() -> LinkPayload {
        LinkPayload {
            anchor: AnchorNumber(42),
            public_key: PublicKey::from_bytes(vec![1, 2, 3]),
            credential_id: Some(CredentialId::new(vec![4]).unwrap()),
        }
    }

    fn awaiting() -> LinkState {
        LinkState::AwaitingRemoteConfirmation { payload: payload() }
    }

    fn step(state: &LinkState, event: LinkEvent, role: LinkRole) -> LinkState {
        transition(state, event, role).unwrap().state
    }

    #[test]
    fn test_origin_polls_until_present() {
        let t = transition(
            &LinkState::LinkRequested {
                anchor: AnchorNumber(42),
            },
            LinkEvent::TentativeRegistered { payload: payload() },
            LinkRole::Origin,
        )
        .unwrap();
        assert_eq!(
            t.effects,
            vec![
                LinkEffect::ShowLink { payload: payload() },
                LinkEffect::PollRegistry
            ]
        );

        let absent = LinkEvent::Polled {
            present: false,
            expired: false,
        };
        let state = step(&t.state, absent.clone(), LinkRole::Origin);
        assert_eq!(state, awaiting());
        let state = step(&state, absent, LinkRole::Origin);
        assert_eq!(state, awaiting());

        let t = transition(
            &state,
            LinkEvent::Polled {
                present: true,
                expired: false,
            },
            LinkRole::Origin,
        )
        .unwrap();
        assert_eq!(t.state, LinkState::Confirmed { payload: payload() });
        assert_eq!(t.effects, vec![LinkEffect::ClearLink, LinkEffect::Completed]);
    }

    #[test]
    fn test_origin_expiry() {
        let t = transition(
            &awaiting(),
            LinkEvent::Polled {
                present: false,
                expired: true,
            },
            LinkRole::Origin,
        )
        .unwrap();
        assert_eq!(t.state, LinkState::Expired);
        assert_eq!(t.effects, vec![LinkEffect::ClearLink]);
    }

    #[test]
    fn test_code_requires_explicit_confirmation() {
        let issued = LinkState::LinkIssued { payload: payload() };
        assert!(transition(
            &issued,
            LinkEvent::CodeSubmitted {
                code: "123".to_string()
            },
            LinkRole::Confirming
        )
        .is_err());

        let state = step(&issued, LinkEvent::UserConfirmed, LinkRole::Confirming);
        let t = transition(
            &state,
            LinkEvent::CodeSubmitted {
                code: " 123 ".to_string(),
            },
            LinkRole::Confirming,
        )
        .unwrap();
        assert_eq!(
            t.effects,
            vec![LinkEffect::SubmitCode {
                code: "123".to_string()
            }]
        );
    }

    #[test]
    fn test_wrong_code_counts_down_to_zero_before_expiry() {
        let mut state = awaiting();
        for retries_left in [2, 1] {
            state = step(
                &state,
                LinkEvent::CodeChecked(VerifyTentativeResult::WrongCode { retries_left }),
                LinkRole::Confirming,
            );
            assert_eq!(
                state,
                LinkState::WrongCode {
                    payload: payload(),
                    retries_left
                }
            );
            assert!(!state.is_terminal());
            state = step(
                &state,
                LinkEvent::CodeSubmitted {
                    code: "000".to_string(),
                },
                LinkRole::Confirming,
            );
        }
        let state = step(
            &state,
            LinkEvent::CodeChecked(VerifyTentativeResult::WrongCode { retries_left: 0 }),
            LinkRole::Confirming,
        );
        assert_eq!(state, LinkState::Expired);
    }

    #[test]
    fn test_cancel_withdraws_tentative_on_origin_only() {
        let t = transition(&awaiting(), LinkEvent::Cancel, LinkRole::Origin).unwrap();
        assert_eq!(t.state, LinkState::Cancelled);
        assert_eq!(
            t.effects,
            vec![LinkEffect::CancelTentative, LinkEffect::ClearLink]
        );

        let t = transition(&awaiting(), LinkEvent::Cancel, LinkRole::Confirming).unwrap();
        assert_eq!(t.state, LinkState::Cancelled);
        assert!(t.effects.is_empty());

        assert!(transition(&LinkState::Expired, LinkEvent::Cancel, LinkRole::Origin).is_err());
    }

    #[test]
    fn test_roles_do_not_mix() {
        assert!(transition(&awaiting(), LinkEvent::UserConfirmed, LinkRole::Origin).is_err());
        assert!(transition(
            &awaiting(),
            LinkEvent::Polled {
                present: true,
                expired: false
            },
            LinkRole::Confirming
        )
        .is_err());
    }

    #[test]
    fn test_failure_is_terminal() {
        let t = transition(
            &awaiting(),
            LinkEvent::Failure(AnchorError::transport("down")),
            LinkRole::Origin,
        )
        .unwrap();
        assert_matches!(t.state, LinkState::Failed { .. });
        assert!(t.state.is_terminal());
    }
}
