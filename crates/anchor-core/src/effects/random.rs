//! Randomness.
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `anchor-effects` (OS entropy), `anchor-testkit` (seeded)

use async_trait::async_trait;
use std::sync::Arc;

/// Source of cryptographically secure randomness
#[async_trait]
pub trait RandomEffects: Send + Sync {
    /// Fill a fresh buffer of `len` random bytes
    async fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// A random 64-bit integer
    async fn random_u64(&self) -> u64;

    /// 32 random bytes, the size of a key seed
    async fn random_bytes_32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (slot, byte) in out.iter_mut().zip(self.random_bytes(32).await) {
            *slot = byte;
        }
        out
    }
}

#[async_trait]
impl<T: RandomEffects + ?Sized> RandomEffects for Arc<T> {
    async fn random_bytes(&self, len: usize) -> Vec<u8> {
        (**self).random_bytes(len).await
    }

    async fn random_u64(&self) -> u64 {
        (**self).random_u64().await
    }
}
