//! Layered TOML configuration, purely ambient convenience over the CLI
//! flags: CLI flags always win, and a missing config file is never an
//! error. Search order: an env var, then a file in the current directory,
//! then the OS config dir.

use crate::cli::CliArgs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub counts_path: Option<String>,
    #[serde(default)]
    pub index_path: Option<String>,
    #[serde(default)]
    pub results_path: Option<String>,
    #[serde(default)]
    pub crawler: CrawlerConfig,
}

/// Crawl-side defaults; the filesystem builder has no equivalent knob
/// (file inclusion is always `.txt`/`.text`), so only the crawler gets an
/// include/exclude setting here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub include_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Search order: `$FCS_CONFIG` -> `./search_engine.toml` -> OS config
    /// dir (`search_engine/config.toml`). Returns `Ok(None)` if nothing is
    /// found anywhere, which is not an error.
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("FCS_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok(Some((Self::from_file(&path)?, path)));
            }
        }

        let local_path = PathBuf::from("search_engine.toml");
        if local_path.exists() {
            return Ok(Some((Self::from_file(&local_path)?, local_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("search_engine").join("config.toml");
            if user_path.exists() {
                return Ok(Some((Self::from_file(&user_path)?, user_path)));
            }
        }

        Ok(None)
    }

    pub fn generate_template() -> String {
        r#"# search_engine configuration
# CLI flags always take precedence over these defaults.

# Default worker count when neither -threads nor -html is given.
# threads = 5

# Default output paths, used only if the matching CLI flag is present
# without an explicit value.
# counts_path = "counts.json"
# index_path = "index.json"
# results_path = "results.json"

[crawler]
include_extensions = []
exclude_patterns = []
"#
        .to_string()
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
        }
        std::fs::write(path, Self::generate_template())
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    /// Fill in any `CliArgs` field the user left unset with this config's
    /// default. Never overrides a value the CLI already provided.
    pub fn apply_to(&self, args: &mut CliArgs) {
        if args.threads.is_none() {
            args.threads = self.threads;
        }
        if args.counts_path.is_none() {
            args.counts_path = self.counts_path.clone().map(PathBuf::from);
        }
        if args.index_path.is_none() {
            args.index_path = self.index_path.clone().map(PathBuf::from);
        }
        if args.results_path.is_none() {
            args.results_path = self.results_path.clone().map(PathBuf::from);
        }
    }
}
