//! Progression configuration loader.

use std::path::Path;

use progression_core::ProgressionConfig;

use crate::loaders::{LoadResult, read_file};

/// Loader for progression configuration from TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config data from a TOML file.
    ///
    /// Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> LoadResult<ProgressionConfig> {
        let content = read_file(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> LoadResult<ProgressionConfig> {
        let config: ProgressionConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?;
        Ok(config)
    }
}
