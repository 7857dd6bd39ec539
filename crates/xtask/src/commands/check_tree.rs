//! Load and validate a progression tree file
//!
//! Parses RON or TOML tree files, runs full validation, and prints the
//! resulting nodes with their computed costs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use progression_content::TreeLoader;
use progression_core::{NodeType, ProgressionNode};

/// Load and validate a tree file
#[derive(Parser)]
pub struct CheckTree {
    /// Tree file (.ron or .toml)
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Summary view (counts per type and tier, auto-unlocked nodes)
    Summary,
    /// Every node, one per line, ordered by tier
    Nodes,
    /// Full JSON output
    Json,
}

impl CheckTree {
    pub fn execute(self) -> Result<()> {
        let (definition, nodes) = TreeLoader::load_nodes(&self.path)
            .with_context(|| format!("Tree check failed: {}", self.path.display()))?;

        println!(
            "{} {}",
            style("Tree File:").bold().cyan(),
            self.path.display()
        );
        if !definition.version.is_empty() {
            println!("{} {}", style("Version:").bold().cyan(), definition.version);
        }
        println!("{} {}", style("Nodes:").bold().cyan(), nodes.len());
        println!();

        match self.format {
            OutputFormat::Summary => print_summary(&nodes, &definition.auto_unlock_keys()),
            OutputFormat::Nodes => print_nodes(&nodes),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&nodes).context("Failed to serialize nodes")?;
                println!("{json}");
            }
        }

        println!("{}", style("✓ Tree is valid").bold().green());
        Ok(())
    }
}

fn print_summary(nodes: &[ProgressionNode], auto_unlock: &[String]) {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_tier: BTreeMap<i32, (usize, u64)> = BTreeMap::new();
    for node in nodes {
        *by_type.entry(node.node_type.to_string()).or_default() += 1;
        let tier = by_tier.entry(node.tier).or_default();
        tier.0 += 1;
        tier.1 += node.unlock_cost;
    }

    println!("{}", style("By Type:").bold().yellow());
    for (node_type, count) in &by_type {
        println!("  {node_type}: {count}");
    }
    println!();

    println!("{}", style("By Tier:").bold().yellow());
    for (tier, (count, cost)) in &by_tier {
        println!("  Tier {tier}: {count} nodes, total cost {cost}");
    }
    println!();

    let upgrades = nodes
        .iter()
        .filter(|node| node.node_type == NodeType::Upgrade)
        .count();
    let modifiers = nodes.iter().filter(|node| node.modifier.is_some()).count();
    println!("  Upgrades with modifiers: {modifiers}/{upgrades}");

    if !auto_unlock.is_empty() {
        println!("  Auto-unlocked: {}", auto_unlock.join(", "));
    }
    println!();
}

fn print_nodes(nodes: &[ProgressionNode]) {
    let mut sorted: Vec<&ProgressionNode> = nodes.iter().collect();
    sorted.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.key.cmp(&b.key)));

    for node in sorted {
        println!(
            "  [{}] {:<32} {:<8} {:<6} cost {:>6}  max {}",
            node.tier,
            style(&node.key).bold(),
            node.node_type,
            node.size,
            node.unlock_cost,
            node.max_level
        );
        if !node.prerequisites.is_empty() {
            println!("      requires {}", node.prerequisites.join(", "));
        }
    }
    println!();
}
