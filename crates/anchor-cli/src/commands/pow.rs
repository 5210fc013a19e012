//! Registration proof-of-work commands
//!
//! Solves and checks proofs offline against the configured registry id, so
//! an operator can calibrate `proof_of_work.difficulty_bits` before rolling
//! it out.

use anchor_core::effects::{PhysicalTimeEffects, RandomEffects};
use anchor_core::{AnchorConfig, ProofOfWork};
use anchor_effects::{RealRandomHandler, RealTimeHandler};
use anchor_identity::pow;
use anyhow::Result;
use clap::Args;
use std::time::Instant;
use tracing::info;

/// Proof-of-work operations
#[derive(Args)]
pub struct PowCommand {
    /// Action to perform
    #[command(subcommand)]
    pub action: PowAction,
}

/// Proof-of-work operations
#[derive(clap::Subcommand)]
pub enum PowAction {
    /// Search for a nonce
    Solve(SolveArgs),
    /// Check a timestamp/nonce pair
    Verify(VerifyArgs),
}

/// Arguments for solving
#[derive(Args)]
pub struct SolveArgs {
    /// Timestamp in ms since the epoch (defaults to now)
    #[arg(long)]
    timestamp: Option<u64>,

    /// First nonce to try (defaults to random)
    #[arg(long)]
    start_nonce: Option<u64>,

    /// Override the configured difficulty
    #[arg(short, long)]
    difficulty: Option<u32>,
}

/// Arguments for verification
#[derive(Args)]
pub struct VerifyArgs {
    /// Timestamp the proof was computed for
    #[arg(long)]
    timestamp: u64,

    /// Nonce to check
    #[arg(long)]
    nonce: u64,

    /// Verifier clock in ms (defaults to now)
    #[arg(long)]
    now: Option<u64>,

    /// Override the configured difficulty
    #[arg(short, long)]
    difficulty: Option<u32>,
}

pub async fn run(cmd: PowCommand, config: &AnchorConfig) -> Result<()> {
    match cmd.action {
        PowAction::Solve(args) => {
            let timestamp_ms = match args.timestamp {
                Some(ts) => ts,
                None => RealTimeHandler::new().now_ms().await?,
            };
            let start_nonce = match args.start_nonce {
                Some(nonce) => nonce,
                None => RealRandomHandler::new().random_u64().await,
            };
            let difficulty = args
                .difficulty
                .unwrap_or(config.proof_of_work.difficulty_bits);

            #[allow(clippy::disallowed_methods)]
            let started = Instant::now();
            let proof = solve(config, timestamp_ms, start_nonce, difficulty)?;
            info!(
                difficulty,
                iterations = proof.nonce.wrapping_sub(start_nonce),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "solved"
            );
            println!("timestamp: {}", proof.timestamp_ms);
            println!("nonce:     {}", proof.nonce);
        }
        PowAction::Verify(args) => {
            let now_ms = match args.now {
                Some(now) => now,
                None => RealTimeHandler::new().now_ms().await?,
            };
            let proof = ProofOfWork {
                timestamp_ms: args.timestamp,
                nonce: args.nonce,
            };
            let difficulty = args
                .difficulty
                .unwrap_or(config.proof_of_work.difficulty_bits);
            verify(config, &proof, difficulty, now_ms)?;
            println!("valid");
        }
    }
    Ok(())
}

fn solve(
    config: &AnchorConfig,
    timestamp_ms: u64,
    start_nonce: u64,
    difficulty: u32,
) -> Result<ProofOfWork> {
    let registry_id = config.registry.principal()?;
    Ok(pow::solve(
        timestamp_ms,
        start_nonce,
        registry_id.as_bytes(),
        difficulty,
    ))
}

fn verify(config: &AnchorConfig, proof: &ProofOfWork, difficulty: u32, now_ms: u64) -> Result<()> {
    let registry_id = config.registry.principal()?;
    pow::verify(
        proof,
        registry_id.as_bytes(),
        difficulty,
        now_ms,
        config.proof_of_work.max_clock_skew_ms,
    )?;
    Ok(())
}
