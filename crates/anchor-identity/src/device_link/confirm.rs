//! Link driver on the authenticated device

use super::flow::{transition, LinkEffect, LinkEvent, LinkRole, LinkState};
use super::link::LinkPayload;
use crate::context::IdentityEffects;
use crate::flow::Transition;
use crate::session::Session;
use anchor_core::{AnchorError, AnchorResult};

/// Confirms a candidate device from a logged-in session
pub struct LinkConfirmation<'s, E: IdentityEffects> {
    session: &'s mut Session<E>,
    state: LinkState,
}

impl<'s, E: IdentityEffects + 'static> LinkConfirmation<'s, E> {
    /// Open a link for the session's anchor.
    ///
    /// Nothing is submitted until [`LinkConfirmation::confirm`] is called.
    pub fn open(session: &'s mut Session<E>, payload: LinkPayload) -> AnchorResult<Self> {
        if payload.anchor != session.anchor() {
            return Err(AnchorError::permission_denied(format!(
                "link is for identity anchor {}, logged in as {}",
                payload.anchor,
                session.anchor()
            )));
        }
        if session.snapshot().contains(&payload.public_key) {
            return Err(AnchorError::invalid("device is already registered"));
        }
        tracing::info!(anchor = %payload.anchor, device = %payload.public_key, "device link opened");
        Ok(Self {
            session,
            state: LinkState::LinkIssued { payload },
        })
    }

    /// Current state
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// Candidate device
    pub fn payload(&self) -> Option<&LinkPayload> {
        self.state.payload()
    }

    /// Record the user's explicit approval of the candidate
    pub fn confirm(&mut self) -> AnchorResult<()> {
        self.apply(LinkEvent::UserConfirmed)?;
        tracing::info!("device link approved by user");
        Ok(())
    }

    /// Submit the verification code shown on the new device
    pub async fn submit_code(&mut self, code: &str) -> AnchorResult<LinkState> {
        let effects = self.apply(LinkEvent::CodeSubmitted {
            code: code.to_string(),
        })?;
        let code = effects
            .into_iter()
            .find_map(|fx| match fx {
                LinkEffect::SubmitCode { code } => Some(code),
                _ => None,
            })
            .ok_or_else(|| AnchorError::internal("code submission emitted nothing to send"))?;
        let payload = self
            .state
            .payload()
            .cloned()
            .ok_or_else(|| AnchorError::internal("link state lost its payload"))?;

        let outcome = match self.session.delegation().await {
            Ok(auth) => {
                self.session
                    .context()
                    .effects()
                    .verify_tentative_device(&auth, payload.anchor, &payload.public_key, &code)
                    .await
            }
            Err(error) => Err(error),
        };
        let result = match outcome {
            Ok(result) => result,
            Err(error) => {
                self.apply(LinkEvent::Failure(error.clone()))?;
                return Err(error);
            }
        };
        tracing::debug!(?result, "registry checked verification code");

        for fx in self.apply(LinkEvent::CodeChecked(result))? {
            if fx == LinkEffect::Completed {
                tracing::info!(anchor = %payload.anchor, device = %payload.public_key, "device linked");
                self.session.refresh_devices().await?;
            }
        }
        Ok(self.state.clone())
    }

    /// Refuse the candidate
    pub fn decline(&mut self) -> AnchorResult<()> {
        self.apply(LinkEvent::Cancel)?;
        tracing::info!("device link declined");
        Ok(())
    }

    fn apply(&mut self, event: LinkEvent) -> AnchorResult<Vec<LinkEffect>> {
        let Transition { state, effects } =
            transition(&self.state, event, LinkRole::Confirming)?;
        tracing::debug!(from = ?self.state, to = ?state, "link transition");
        self.state = state;
        Ok(effects)
    }
}
