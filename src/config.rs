//! Configuration for Routebook.
//!
//! Loaded from ~/.config/routebook/routebook.yml or ./routebook.yml. Secrets are
//! never stored here; the config names the environment variables that hold them.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub timeouts: TimeoutConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub rest: RestStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("routebook")
                .join("routebook.db"),
            rest: RestStoreConfig::default(),
        }
    }
}

/// Row store reached over a PostgREST-compatible API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestStoreConfig {
    pub url: Option<String>,
    pub api_key_env: String,
}

impl Default for RestStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: "ROUTEBOOK_STORE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

/// Per-call deadlines for every external collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub catalog_ms: u64,
    pub llm_ms: u64,
    pub store_ms: u64,
    pub tool_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            catalog_ms: 15_000,
            llm_ms: 120_000,
            store_ms: 10_000,
            tool_ms: 60_000,
        }
    }
}

impl TimeoutConfig {
    pub fn catalog(&self) -> Duration {
        Duration::from_millis(self.catalog_ms)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_millis(self.llm_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_millis(self.tool_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Judgments below this confidence are treated as no match
    pub min_confidence: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { min_confidence: 0.5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            llm: LlmConfig::default(),
            timeouts: TimeoutConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.catalog_ms == 0 || t.llm_ms == 0 || t.store_ms == 0 || t.tool_ms == 0 {
            eyre::bail!("timeouts must all be > 0");
        }
        if !(self.matching.min_confidence > 0.0 && self.matching.min_confidence <= 1.0) {
            eyre::bail!("matching.min_confidence must be in (0, 1]");
        }
        if self.store.backend == StoreBackend::Rest && self.store.rest.url.is_none() {
            eyre::bail!("store.rest.url is required when store.backend is rest");
        }
        if self.llm.max_tokens == 0 {
            eyre::bail!("llm.max_tokens must be > 0");
        }
        Ok(())
    }
}
