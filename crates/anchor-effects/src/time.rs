//! Layer 3: Time Effect Handler - Production Only
//!
//! Delegates to the operating system clock and the tokio timer.

use anchor_core::effects::PhysicalTimeEffects;
use anchor_core::AnchorResult;
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Real time handler for production use
#[derive(Debug, Clone, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a new real time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    #[allow(clippy::disallowed_methods)]
    async fn now_ms(&self) -> AnchorResult<u64> {
        // SystemTime::now() is only allowed in production handlers.
        Ok(SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64)
    }

    async fn sleep_ms(&self, ms: u64) -> AnchorResult<()> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}
