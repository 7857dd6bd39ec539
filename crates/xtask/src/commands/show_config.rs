//! Print the effective progression configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use progression_content::ConfigLoader;
use progression_core::ProgressionConfig;

/// Print the effective progression configuration
#[derive(Parser)]
pub struct ShowConfig {
    /// TOML config file. Defaults apply when omitted.
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,
}

impl ShowConfig {
    pub fn execute(self) -> Result<()> {
        let config = match &self.path {
            Some(path) => ConfigLoader::load(path)?,
            None => ProgressionConfig::default(),
        };

        let source = self
            .path
            .as_ref()
            .map_or_else(|| "defaults".to_owned(), |path| path.display().to_string());
        println!("{} {}", style("Config:").bold().cyan(), source);

        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{json}");
        Ok(())
    }
}
