//! Development tasks for the progression workspace
//!
//! This binary provides development utilities using the cargo-xtask pattern.
//! Run with: `cargo xtask <command>`

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CheckTree, ShowConfig, Simulate};

/// Development tasks for the progression workspace
#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tools for progression trees", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Load and validate a tree file
    CheckTree(CheckTree),

    /// Play a tree through voting and unlock cycles in memory
    Simulate(Simulate),

    /// Print the effective progression configuration
    ShowConfig(ShowConfig),
}

fn main() -> Result<()> {
    // Load .env file if it exists (for RUST_LOG and other env vars)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::CheckTree(cmd) => cmd.execute(),
        Command::Simulate(cmd) => cmd.execute(),
        Command::ShowConfig(cmd) => cmd.execute(),
    }
}
