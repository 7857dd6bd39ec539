//! Play a tree through voting and unlock cycles in memory
//!
//! Each round random voters pick among the open options, voting closes, and
//! a fixed contribution is added. The run stops when every node is at its
//! max level or the round budget is spent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use progression_content::{ConfigLoader, TreeLoader};
use progression_core::ProgressionConfig;
use progression_runtime::{
    EventKind, InMemoryEventBus, ProgressionEvent, ProgressionOrchestrator, RuntimeError,
};
use rand::seq::SliceRandom;
use tokio::sync::broadcast;

/// Play a tree through voting and unlock cycles in memory
#[derive(Parser)]
pub struct Simulate {
    /// Tree file (.ron or .toml)
    #[arg(value_name = "PATH")]
    tree: PathBuf,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of rounds
    #[arg(short, long, default_value_t = 50)]
    rounds: u32,

    /// Voters per round
    #[arg(short, long, default_value_t = 5)]
    voters: u32,

    /// Contribution added per round
    #[arg(long, default_value_t = 250)]
    contribution: u64,
}

impl Simulate {
    pub fn execute(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start tokio runtime")?;
        runtime.block_on(self.run())
    }

    async fn run(self) -> Result<()> {
        let definition = TreeLoader::load(&self.tree)?;
        let config = match &self.config {
            Some(path) => ConfigLoader::load(path)?,
            None => ProgressionConfig::default(),
        };

        let bus = InMemoryEventBus::with_capacity(config.event_buffer_size.max(256));
        let mut unlocked_rx = bus.subscribe_channel(EventKind::NodeUnlocked);
        let mut all_unlocked_rx = bus.subscribe_channel(EventKind::AllUnlocked);

        let orchestrator = ProgressionOrchestrator::builder()
            .config(config)
            .event_bus(Arc::new(bus))
            .build();

        let report = orchestrator.sync_tree(&definition).await?;
        println!(
            "{} {} inserted, {} auto-unlocked",
            style("Synced:").bold().cyan(),
            report.inserted,
            report.auto_unlocked.len()
        );
        orchestrator.initialize().await?;
        orchestrator.flush_unlock_checks().await;
        print_unlocks(&mut unlocked_rx);

        let mut rng = rand::thread_rng();
        for round in 1..=self.rounds {
            if all_unlocked_rx.try_recv().is_ok() {
                break;
            }

            println!("{}", style(format!("Round {round}")).bold().yellow());
            self.run_votes(&orchestrator, round, &mut rng).await?;

            let total = orchestrator.add_contribution(self.contribution).await?;
            orchestrator.flush_unlock_checks().await;
            println!("  contributed {}, ledger at {total}", self.contribution);
            print_unlocks(&mut unlocked_rx);

            if orchestrator.status().await?.all_unlocked {
                break;
            }
        }

        let status = orchestrator.status().await?;
        println!();
        println!(
            "{} {}/{} nodes unlocked",
            style("Result:").bold().cyan(),
            status.unlocked_nodes,
            status.total_nodes
        );
        if status.all_unlocked {
            println!("{}", style("✓ Tree fully unlocked").bold().green());
        } else if let Some(target) = status.target_key {
            let accumulated = status.progress.map_or(0, |progress| progress.contributions_accumulated);
            println!(
                "  target {target}: {accumulated}/{}",
                status.target_cost.unwrap_or_default()
            );
        }

        orchestrator
            .shutdown(tokio::time::Instant::now() + Duration::from_secs(5))
            .await?;
        Ok(())
    }

    /// Votes in the open session and closes it. Sessions created by
    /// auto-selection are left alone.
    async fn run_votes(
        &self,
        orchestrator: &ProgressionOrchestrator,
        round: u32,
        rng: &mut impl rand::Rng,
    ) -> Result<()> {
        let Some(session) = orchestrator.active_session().await? else {
            return Ok(());
        };
        let targeted = orchestrator
            .unlock_progress()
            .await?
            .is_some_and(|progress| progress.target().is_some());
        if session.options.len() == 1 && targeted {
            return Ok(());
        }

        for voter in 0..self.voters {
            let Some(option) = session.options.choose(rng) else {
                break;
            };
            let user = format!("voter-{round}-{voter}");
            orchestrator
                .vote_for_unlock("sim", &user, &option.node_key)
                .await?;
        }

        match orchestrator.end_voting().await {
            Ok(winner) => {
                println!(
                    "  vote won by {} ({} votes)",
                    style(&winner.node_key).bold(),
                    winner.vote_count
                );
                Ok(())
            }
            Err(RuntimeError::NoActiveSession) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn print_unlocks(rx: &mut broadcast::Receiver<ProgressionEvent>) {
    loop {
        match rx.try_recv() {
            Ok(ProgressionEvent::NodeUnlocked { node_key, level }) => {
                println!("  {} {node_key} (level {level})", style("unlocked").green());
            }
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                println!("  ... {skipped} unlock events skipped");
            }
            Err(_) => break,
        }
    }
}
