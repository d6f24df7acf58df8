//! Configuration for sipmeta
//!
//! Loaded from TOML. Every field has a default so an absent file, or a file
//! with only a few keys, is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const CONFIG_ENV: &str = "SIPMETA_CONFIG";

/// Upper bound for `cache.ttl_days` (ten years)
pub const MAX_TTL_DAYS: u64 = 3650;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub maintenance: MaintenanceConfig,
    pub server: ServerConfig,
}

/// Remote endpoints queried by the fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub metadata_api_url: String,
    pub stacks_api_url: String,
    pub ipfs_gateway: String,
    /// Per-request timeout; unset means reqwest's default (none)
    pub request_timeout_secs: Option<u64>,
    pub placeholder_image_base: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            metadata_api_url: "https://metadata.sipmeta.dev".to_string(),
            stacks_api_url: "https://api.hiro.so".to_string(),
            ipfs_gateway: "https://ipfs.io/ipfs/".to_string(),
            request_timeout_secs: None,
            placeholder_image_base: "https://placehold.co/400x400?text=".to_string(),
        }
    }
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_days: 30 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sipmeta");
        Self {
            backend: StoreBackend::default(),
            path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub score_threshold: u8,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 1000,
            score_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3400 }
    }
}

impl Config {
    /// `<config_dir>/sipmeta/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sipmeta").join("config.toml"))
    }

    /// Load from an explicit path; the file must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file: explicit path, then `SIPMETA_CONFIG`, then
    /// the default location. Only the default location may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checked on load; call again after applying overrides
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TTL_DAYS).contains(&self.cache.ttl_days) {
            anyhow::bail!("cache.ttl_days must be between 1 and {}", MAX_TTL_DAYS);
        }
        if self.maintenance.batch_size == 0 {
            anyhow::bail!("maintenance.batch_size must be at least 1");
        }
        if self.maintenance.score_threshold > 100 {
            anyhow::bail!("maintenance.score_threshold must be between 0 and 100");
        }
        for (name, url) in [
            ("sources.metadata_api_url", &self.sources.metadata_api_url),
            ("sources.stacks_api_url", &self.sources.stacks_api_url),
            ("sources.ipfs_gateway", &self.sources.ipfs_gateway),
        ] {
            let parsed = Url::parse(url).with_context(|| format!("{} is not a valid URL: '{}'", name, url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
            }
        }
        Ok(())
    }
}
