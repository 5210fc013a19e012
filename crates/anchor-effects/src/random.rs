//! Random effect handler
//!
//! Uses `rand::thread_rng()`; this is the layer where real system randomness
//! is provided.

#![allow(clippy::disallowed_methods)]

use anchor_core::effects::RandomEffects;
use async_trait::async_trait;
use rand::RngCore;

/// Cryptographically secure randomness from the OS-seeded thread RNG
#[derive(Debug, Clone, Default)]
pub struct RealRandomHandler;

impl RealRandomHandler {
    /// Create a new real random handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RandomEffects for RealRandomHandler {
    async fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    async fn random_u64(&self) -> u64 {
        rand::thread_rng().next_u64()
    }

    async fn random_bytes_32(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }
}
