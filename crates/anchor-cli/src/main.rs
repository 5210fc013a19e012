//! Operator CLI for anchor identities
//!
//! Offline tooling around the client flows: solving and checking
//! registration proofs of work, generating and deriving recovery phrases,
//! encoding device links, and inspecting the effective configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    common,
    config::{self, ConfigCommand},
    link::{self, LinkCommand},
    pow::{self, PowCommand},
    recovery::{self, RecoveryCommand},
};

#[derive(Parser)]
#[command(name = "anchor")]
#[command(about = "Anchor - pseudonymous multi-device identity tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Registration proof-of-work
    Pow(PowCommand),
    /// Recovery phrase generation and key derivation
    Recovery(RecoveryCommand),
    /// Device link encoding
    Link(LinkCommand),
    /// Effective configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = common::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Pow(cmd) => pow::run(cmd, &config).await?,
        Commands::Recovery(cmd) => recovery::run(cmd, &config).await?,
        Commands::Link(cmd) => link::run(cmd)?,
        Commands::Config(cmd) => config::run(cmd, &config)?,
    }

    Ok(())
}
