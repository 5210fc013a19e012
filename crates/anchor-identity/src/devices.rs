//! Device mutation rules
//!
//! Every mutation is checked against the session's device snapshot before
//! the registry is contacted. Refusals here cost no registry call:
//!
//! - `add_device`: descriptor must validate and must not duplicate a key or
//!   credential already bound to the anchor.
//! - `remove_device`: at least one device must remain.
//! - `replace_device`: the replaced device must exist.
//! - a protected device can only be removed or replaced from a session
//!   logged in with that device.
//!
//! Once the registry confirms a mutation the snapshot is updated locally
//! first, so a failed refresh afterwards never leaves a stale device list
//! behind for the next local check. Removing or replacing the device that
//! backs the current session with a different key logs the session out, so
//! no delegation derived from a revoked device stays in use.

use crate::context::IdentityEffects;
use crate::session::Session;
use anchor_core::effects::CredentialRegistryEffects;
use anchor_core::{
    AnchorError, AnchorNumber, AnchorResult, DeviceData, DeviceSnapshot, Protection, PublicKey,
};

/// Applies device mutations for a logged-in session
pub struct DeviceManager<'s, E: IdentityEffects> {
    session: &'s mut Session<E>,
}

impl<'s, E: IdentityEffects + 'static> DeviceManager<'s, E> {
    /// Manage the devices of the session's anchor
    pub fn new(session: &'s mut Session<E>) -> Self {
        Self { session }
    }

    /// Bind a new device to the anchor
    pub async fn add_device(&mut self, device: DeviceData) -> AnchorResult<()> {
        device.validate()?;
        let snapshot = self.session.snapshot();
        if snapshot.contains(&device.public_key) {
            return Err(AnchorError::invalid("device is already registered"));
        }
        if let Some(credential_id) = &device.credential_id {
            if snapshot.credential_ids().contains(credential_id) {
                return Err(AnchorError::invalid("credential is already registered"));
            }
        }

        let auth = self.session.delegation().await?;
        let anchor = self.session.anchor();
        tracing::info!(%anchor, alias = %device.alias, purpose = ?device.purpose, "adding device");
        self.session
            .context()
            .effects()
            .add_device(&auth, anchor, device.clone())
            .await?;

        self.update_snapshot(|devices| devices.push(device));
        self.refresh().await;
        Ok(())
    }

    /// Unbind the device with `public_key`
    pub async fn remove_device(&mut self, public_key: &PublicKey) -> AnchorResult<()> {
        let snapshot = self.session.snapshot();
        let target = snapshot.find(public_key).ok_or_else(|| {
            AnchorError::not_found(format!("no device with public key {public_key}"))
        })?;
        self.check_protection(target)?;
        if snapshot.remaining_after_removal(public_key) == 0 {
            tracing::warn!(anchor = %snapshot.anchor, "refusing to remove the last device");
            return Err(AnchorError::LastDeviceRemoval);
        }

        let auth = self.session.delegation().await?;
        let anchor = self.session.anchor();
        tracing::info!(%anchor, device = %public_key, "removing device");
        self.session
            .context()
            .effects()
            .remove_device(&auth, anchor, public_key)
            .await?;

        self.update_snapshot(|devices| devices.retain(|d| &d.public_key != public_key));
        self.after_revocation(public_key, None).await;
        Ok(())
    }

    /// Swap the device with `public_key` for `device`
    pub async fn replace_device(
        &mut self,
        public_key: &PublicKey,
        device: DeviceData,
    ) -> AnchorResult<()> {
        device.validate()?;
        let snapshot = self.session.snapshot();
        let target = snapshot.find(public_key).ok_or_else(|| {
            AnchorError::not_found(format!("no device with public key {public_key}"))
        })?;
        self.check_protection(target)?;
        if &device.public_key != public_key && snapshot.contains(&device.public_key) {
            return Err(AnchorError::invalid("replacement device is already registered"));
        }

        let auth = self.session.delegation().await?;
        let anchor = self.session.anchor();
        tracing::info!(%anchor, device = %public_key, replacement = %device.public_key, "replacing device");
        self.session
            .context()
            .effects()
            .replace_device(&auth, anchor, public_key, device.clone())
            .await?;

        let successor = device.public_key.clone();
        self.update_snapshot(|devices| {
            if let Some(slot) = devices.iter_mut().find(|d| &d.public_key == public_key) {
                *slot = device;
            }
        });
        self.after_revocation(public_key, Some(&successor)).await;
        Ok(())
    }

    fn check_protection(&self, target: &DeviceData) -> AnchorResult<()> {
        if target.protection == Protection::Protected
            && &target.public_key != self.session.device_public_key()
        {
            return Err(AnchorError::permission_denied(
                "protected device can only be changed by itself",
            ));
        }
        Ok(())
    }

    fn update_snapshot(&mut self, change: impl FnOnce(&mut Vec<DeviceData>)) {
        let anchor = self.session.anchor();
        let mut devices = self.session.snapshot().devices.clone();
        change(&mut devices);
        self.session.set_snapshot(DeviceSnapshot::new(anchor, devices));
    }

    async fn after_revocation(&mut self, revoked: &PublicKey, successor: Option<&PublicKey>) {
        if self.session.device_public_key() == revoked && successor != Some(revoked) {
            tracing::info!(
                anchor = %self.session.anchor(),
                "device backing this session was revoked; logging out"
            );
            self.session.logout();
            return;
        }
        self.refresh().await;
    }

    /// The registry already applied the change; a failed re-read keeps the local update
    async fn refresh(&mut self) {
        if let Err(error) = self.session.refresh_devices().await {
            tracing::warn!(anchor = %self.session.anchor(), %error, "could not refresh devices after change");
        }
    }
}

/// Authentication devices currently registered for `anchor`
pub async fn lookup_authentication_devices<R>(
    registry: &R,
    anchor: AnchorNumber,
) -> AnchorResult<Vec<DeviceData>>
where
    R: CredentialRegistryEffects + ?Sized,
{
    let devices = registry.lookup_devices(anchor).await?;
    Ok(DeviceSnapshot::new(anchor, devices).authentication_devices())
}

/// Recovery devices currently registered for `anchor`
pub async fn lookup_recovery_devices<R>(
    registry: &R,
    anchor: AnchorNumber,
) -> AnchorResult<Vec<DeviceData>>
where
    R: CredentialRegistryEffects + ?Sized,
{
    let devices = registry.lookup_devices(anchor).await?;
    Ok(DeviceSnapshot::new(anchor, devices).recovery_devices())
}
