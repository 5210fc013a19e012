//! Proof-of-work search
//!
//! The search is CPU-bound and runs to completion on the calling task; it
//! happens once per registration, never per login. It starts at a random
//! nonce and counts upwards, wrapping at `u64::MAX`.

use crate::context::{IdentityContext, IdentityEffects};
use anchor_core::proof_of_work::meets_difficulty;
use anchor_core::{AnchorResult, ProofOfWork};
use std::time::Instant;

pub use anchor_core::proof_of_work::{message, verify, POW_DOMAIN};

/// Find a nonce for `timestamp_ms` starting the search at `start_nonce`
pub fn solve(
    timestamp_ms: u64,
    start_nonce: u64,
    registry_id: &[u8],
    difficulty_bits: u32,
) -> ProofOfWork {
    let mut pow = ProofOfWork {
        timestamp_ms,
        nonce: start_nonce,
    };
    while !meets_difficulty(&pow, registry_id, difficulty_bits) {
        pow.nonce = pow.nonce.wrapping_add(1);
    }
    pow
}

/// Compute a proof for the current time with the configured difficulty
pub async fn compute_proof_of_work<E: IdentityEffects>(
    ctx: &IdentityContext<E>,
) -> AnchorResult<ProofOfWork> {
    let timestamp_ms = ctx.effects().now_ms().await?;
    compute_proof_of_work_at(ctx, timestamp_ms).await
}

/// Compute a proof for `timestamp_ms` with the configured difficulty
pub async fn compute_proof_of_work_at<E: IdentityEffects>(
    ctx: &IdentityContext<E>,
    timestamp_ms: u64,
) -> AnchorResult<ProofOfWork> {
    let registry_id = ctx.registry_id()?;
    let difficulty_bits = ctx.config().proof_of_work.difficulty_bits;
    let start_nonce = ctx.effects().random_u64().await;

    #[allow(clippy::disallowed_methods)]
    let started = Instant::now();
    let pow = solve(timestamp_ms, start_nonce, &registry_id, difficulty_bits);
    tracing::info!(
        difficulty_bits,
        iterations = pow.nonce.wrapping_sub(start_nonce),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof of work solved"
    );
    Ok(pow)
}
