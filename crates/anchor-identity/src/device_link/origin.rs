//! Link driver on the new device

use super::flow::{transition, LinkEffect, LinkEvent, LinkRole, LinkState};
use super::link::{clear_link, LinkPayload};
use crate::context::{CancelHandle, IdentityContext, IdentityEffects};
use crate::devices::lookup_authentication_devices;
use crate::flow::Transition;
use anchor_core::effects::CredentialCreation;
use anchor_core::{AnchorError, AnchorNumber, AnchorResult, DeviceData, Purpose};
use url::Url;

/// Link shown to the user on the new device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLink {
    /// Candidate device
    pub payload: LinkPayload,
    /// Code to type on the confirming device
    pub verification_code: String,
    /// Registry deadline for confirmation
    pub expiration_ms: u64,
}

/// Drives the link flow on a device without a session
pub struct LinkOrigin<E: IdentityEffects> {
    ctx: IdentityContext<E>,
    state: LinkState,
    issued: Option<IssuedLink>,
    cancel: CancelHandle,
}

impl<E: IdentityEffects> LinkOrigin<E> {
    /// Driver for a link to `anchor`
    pub fn new(ctx: IdentityContext<E>, anchor: AnchorNumber) -> Self {
        Self {
            ctx,
            state: LinkState::LinkRequested { anchor },
            issued: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> &LinkState {
        &self.state
    }

    /// The issued link, once registered
    pub fn issued(&self) -> Option<&IssuedLink> {
        self.issued.as_ref()
    }

    /// Handle that stops polling and withdraws the candidate
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Create a credential for this device and park it at the registry
    pub async fn request(&mut self, alias: &str) -> AnchorResult<IssuedLink> {
        let LinkState::LinkRequested { anchor } = self.state else {
            return Err(AnchorError::invalid("link already requested"));
        };
        self.cancel.check()?;

        let exclude_credentials = match self.ctx.effects().lookup_devices(anchor).await {
            Ok(devices) => devices.into_iter().filter_map(|d| d.credential_id).collect(),
            Err(error) => {
                tracing::warn!(%anchor, %error, "could not read existing devices; excluding none");
                Vec::new()
            }
        };

        let credential = {
            let _ceremony = self.ctx.gate().begin("create link credential")?;
            let user_handle = self.ctx.effects().random_bytes(16).await;
            self.ctx
                .effects()
                .create_credential(CredentialCreation {
                    display_name: alias.to_string(),
                    user_handle,
                    exclude_credentials,
                    attachment: None,
                })
                .await?
        };

        let device = DeviceData::authenticator(
            alias,
            credential.public_key.clone(),
            credential.credential_id.clone(),
            credential.key_type,
            Purpose::Authentication,
        );
        device.validate()?;

        let registration = match self
            .ctx
            .effects()
            .register_tentative_device(anchor, device)
            .await
        {
            Ok(registration) => registration,
            Err(error) => {
                self.apply(LinkEvent::Failure(error.clone()), None)?;
                return Err(error);
            }
        };

        let payload = LinkPayload {
            anchor,
            public_key: credential.public_key,
            credential_id: Some(credential.credential_id),
        };
        self.apply(
            LinkEvent::TentativeRegistered {
                payload: payload.clone(),
            },
            None,
        )?;

        let issued = IssuedLink {
            payload,
            verification_code: registration.verification_code,
            expiration_ms: registration.expiration_ms,
        };
        tracing::info!(%anchor, expiration_ms = issued.expiration_ms, "device link issued");
        self.issued = Some(issued.clone());
        Ok(issued)
    }

    /// Poll the registry until the candidate is confirmed, expires, or the
    /// flow is cancelled.
    ///
    /// `location` is where the link was carried; its fragment is cleared when
    /// the flow ends.
    pub async fn wait_for_confirmation(&mut self, location: &mut Url) -> AnchorResult<LinkState> {
        let issued = self
            .issued
            .clone()
            .ok_or_else(|| AnchorError::invalid("no link issued"))?;
        let interval = self.ctx.config().device_link.effective_poll_interval_ms();
        let anchor = issued.payload.anchor;

        while !self.state.is_terminal() {
            let cancelled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => true,
                slept = self.ctx.effects().sleep_ms(interval) => {
                    slept?;
                    false
                }
            };
            if cancelled {
                self.withdraw(location).await?;
                return Err(AnchorError::UserCancelled);
            }

            let devices = match lookup_authentication_devices(self.ctx.effects(), anchor).await {
                Ok(devices) => devices,
                Err(error) => {
                    self.apply(LinkEvent::Failure(error.clone()), Some(&mut *location))?;
                    return Err(error);
                }
            };
            let present = devices
                .iter()
                .any(|d| d.public_key == issued.payload.public_key);
            let now_ms = self.ctx.effects().now_ms().await?;
            let expired = !present && now_ms >= issued.expiration_ms;
            tracing::debug!(%anchor, present, expired, "polled for linked device");

            self.apply(LinkEvent::Polled { present, expired }, Some(&mut *location))?;
        }

        Ok(self.state.clone())
    }

    /// Abandon the link and withdraw the candidate
    pub async fn cancel(&mut self, location: &mut Url) -> AnchorResult<()> {
        self.cancel.cancel();
        self.withdraw(location).await
    }

    async fn withdraw(&mut self, location: &mut Url) -> AnchorResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let pending = self.state.payload().cloned();
        let effects = self.apply(LinkEvent::Cancel, Some(&mut *location))?;
        if effects.contains(&LinkEffect::CancelTentative) {
            if let Some(payload) = pending {
                self.ctx
                    .effects()
                    .cancel_tentative_device(payload.anchor, &payload.public_key)
                    .await?;
            }
        }
        tracing::info!("device link cancelled");
        Ok(())
    }

    /// Apply `event`, performing the location effect immediately
    fn apply(
        &mut self,
        event: LinkEvent,
        location: Option<&mut Url>,
    ) -> AnchorResult<Vec<LinkEffect>> {
        let Transition { state, effects } = transition(&self.state, event, LinkRole::Origin)?;
        tracing::debug!(from = ?self.state, to = ?state, "link transition");
        self.state = state;
        if effects.contains(&LinkEffect::ClearLink) {
            if let Some(url) = location {
                clear_link(url);
            }
        }
        Ok(effects)
    }
}
