//! Simulated physical clock
//!
//! Sleeping advances the clock instead of waiting, then yields so that
//! other futures on the same task (`tokio::join!`) get to run. A flow that
//! polls every few seconds for minutes completes instantly in a test.

use anchor_core::effects::PhysicalTimeEffects;
use anchor_core::AnchorResult;
use async_trait::async_trait;
use anchor_core::AnchorError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Start of simulated time used by the fixtures (2022-04-15T05:20:00Z)
pub const DEFAULT_START_MS: u64 = 1_650_000_000_000;

/// Shared, manually driven clock
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now_ms: Arc<AtomicU64>,
    fail_next: Arc<AtomicBool>,
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(DEFAULT_START_MS)
    }
}

impl SimulatedClock {
    /// Clock reading `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current reading
    pub fn now(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    /// Move the clock forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set an absolute reading
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    /// Make the next `now_ms` effect call fail; `now` is unaffected
    pub fn fail_next_reading(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhysicalTimeEffects for SimulatedClock {
    async fn now_ms(&self) -> AnchorResult<u64> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AnchorError::internal("clock unavailable"));
        }
        Ok(self.now())
    }

    async fn sleep_ms(&self, ms: u64) -> AnchorResult<()> {
        self.advance(ms);
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_shared_clock() {
        let clock = SimulatedClock::new(1_000);
        let other = clock.clone();
        clock.sleep_ms(250).await.unwrap();
        assert_eq!(other.now_ms().await.unwrap(), 1_250);
        other.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[tokio::test]
    async fn test_failed_reading_is_one_shot() {
        let clock = SimulatedClock::new(7);
        clock.fail_next_reading();
        assert!(clock.now_ms().await.is_err());
        assert_eq!(clock.now_ms().await.unwrap(), 7);
    }
}
