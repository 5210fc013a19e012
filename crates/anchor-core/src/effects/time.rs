//! Wall-clock time.
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `anchor-effects` (Layer 3), `anchor-testkit` (simulated)
//!
//! Timestamps are milliseconds since the Unix epoch throughout the workspace.

use crate::errors::AnchorResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Wall-clock time in milliseconds since the Unix epoch
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current time in milliseconds since the Unix epoch
    async fn now_ms(&self) -> AnchorResult<u64>;

    /// Suspend the calling task for `ms` milliseconds
    async fn sleep_ms(&self, ms: u64) -> AnchorResult<()>;
}

#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for Arc<T> {
    async fn now_ms(&self) -> AnchorResult<u64> {
        (**self).now_ms().await
    }

    async fn sleep_ms(&self, ms: u64) -> AnchorResult<()> {
        (**self).sleep_ms(ms).await
    }
}
