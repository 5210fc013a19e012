//! Seeded randomness
//!
//! ChaCha20 seeded from a `u64`, so every run of a test sees the same
//! session keys, nonces and phrases.

use anchor_core::effects::RandomEffects;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

/// Deterministic random source
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SeededRandom {
    /// Source seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }
}

#[async_trait]
impl RandomEffects for SeededRandom {
    async fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.lock().fill_bytes(&mut bytes);
        bytes
    }

    async fn random_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }
}
