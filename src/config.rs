//! Configuration loading
//!
//! Data sources ("live", "sim", ...) each map to a pair of export roots:
//! a dated tree for unit asset/positions exports and a flat directory for
//! futures exports. Units that export through the standalone terminal are
//! listed under `account_overrides` and take their equity side from an
//! `Account-*.csv` directory instead.
//!
//! Default location: `~/.fundlens/config.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Export roots for one data source
#[derive(Debug, Clone, Deserialize)]
pub struct SourcePaths {
    /// Dated tree: `<asset_root>/YYYYMMDD/**` holds unit asset and
    /// positions exports.
    pub asset_root: PathBuf,

    /// Flat directory of futures asset exports. Optional; sources without
    /// futures accounts simply aggregate the equity side alone.
    #[serde(default)]
    pub futures_root: Option<PathBuf>,

    /// unit name -> flat directory of `Account-YYYYMMDD_HHMMSS.csv` files
    /// replacing that unit's equity feed.
    #[serde(default)]
    pub account_overrides: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Overrides the default `~/.fundlens/data.db`
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Data source name -> roots, e.g. `[sources.live]`, `[sources.sim]`
    pub sources: HashMap<String, SourcePaths>,
}

impl Config {
    pub fn source(&self, name: &str) -> Result<&SourcePaths> {
        self.sources.get(name).ok_or_else(|| {
            anyhow::anyhow!(crate::error::FundError::ConfigError(format!(
                "unknown data source '{}' (configured: {})",
                name,
                self.sources.keys().cloned().collect::<Vec<_>>().join(", ")
            )))
        })
    }
}

/// Get the default config path (~/.fundlens/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(fundlens_home()?.join("config.toml"))
}

/// Get the fundlens home directory (~/.fundlens), creating it if needed
pub fn fundlens_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let dir = PathBuf::from(home).join(".fundlens");
    std::fs::create_dir_all(&dir).context("Failed to create .fundlens directory")?;
    Ok(dir)
}

/// Load configuration from the given path, or the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {:?}", path))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("Invalid config at {:?}", path))?;
    Ok(config)
}
