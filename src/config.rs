use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::discovery::DiscoverySettings;
use crate::filter_state::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub stats: StatsConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the remote data service
    pub base_url: String,

    /// Request timeout in seconds; "no response" becomes a failure here
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default page size for new views
    pub page_size: u32,

    /// Seconds a cached result set counts as fresh
    pub result_freshness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds the aggregate stats read counts as fresh. Aggregates move
    /// slower than paginated results, so this is the longer window.
    pub freshness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Milliseconds between simulated progress steps
    pub progress_tick_ms: u64,

    /// Seconds a finished export stays visible before resetting to idle
    pub cooldown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            search: SearchConfig::default(),
            stats: StatsConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            result_freshness_secs: 60,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 300,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            progress_tick_ms: 150,
            cooldown_secs: 4,
        }
    }
}

impl Config {
    /// Load config from the default location, creating a default file on
    /// first run. A malformed file falls back to defaults with a warning
    /// rather than failing the program.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path (CLI `--config`).
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;

        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!(
                    target: "config",
                    path = %path.display(),
                    error = %err,
                    "malformed config file, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("cannot determine config directory")?;
        Ok(config_dir.join("bandi-cli").join("config.toml"))
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            result_ttl: Duration::from_secs(self.search.result_freshness_secs),
            stats_ttl: Duration::from_secs(self.stats.freshness_secs),
            export_tick: Duration::from_millis(self.export.progress_tick_ms),
            export_cooldown: Duration::from_secs(self.export.cooldown_secs),
        }
    }
}
