use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "IngestConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "IngestConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "IngestConfig::default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl IngestConfig {
    fn default_queue_capacity() -> usize {
        10_000
    }

    fn default_batch_size() -> usize {
        100
    }

    fn default_flush_interval_ms() -> u64 {
        1_000
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_queue_capacity(),
            batch_size: Self::default_batch_size(),
            flush_interval_ms: Self::default_flush_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_path")]
    pub path: String,
}

impl DatabaseConfig {
    fn default_path() -> String {
        "data/formflow.db".to_string()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: usize,
    /// Public form views are served from cache for at most this long.
    #[serde(default = "CacheConfig::default_public_form_ttl_secs")]
    pub public_form_ttl_secs: u64,
    #[serde(default = "CacheConfig::default_templates_ttl_secs")]
    pub templates_ttl_secs: u64,
}

impl CacheConfig {
    fn default_max_entries() -> usize {
        10_000
    }

    fn default_public_form_ttl_secs() -> u64 {
        5 * 60
    }

    fn default_templates_ttl_secs() -> u64 {
        7 * 24 * 60 * 60
    }

    pub fn public_form_ttl(&self) -> Duration {
        Duration::from_secs(self.public_form_ttl_secs)
    }

    pub fn templates_ttl(&self) -> Duration {
        Duration::from_secs(self.templates_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Self::default_max_entries(),
            public_form_ttl_secs: Self::default_public_form_ttl_secs(),
            templates_ttl_secs: Self::default_templates_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            ingest: IngestConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("FORMFLOW_ENV").unwrap_or_else(|_| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.ingest.queue_capacity > 0,
            "ingest.queue_capacity must be > 0"
        );
        anyhow::ensure!(self.ingest.batch_size > 0, "ingest.batch_size must be > 0");
        anyhow::ensure!(
            self.ingest.batch_size <= self.ingest.queue_capacity,
            "ingest.batch_size cannot exceed ingest.queue_capacity"
        );
        anyhow::ensure!(
            self.ingest.flush_interval_ms > 0,
            "ingest.flush_interval_ms must be > 0"
        );
        anyhow::ensure!(
            !self.database.path.trim().is_empty(),
            "database.path cannot be empty"
        );
        anyhow::ensure!(self.cache.max_entries > 0, "cache.max_entries must be > 0");
        anyhow::ensure!(
            self.cache.public_form_ttl_secs > 0 && self.cache.templates_ttl_secs > 0,
            "cache TTLs must be > 0"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    settings: Settings,
    config_dir: PathBuf,
    env: String,
}

impl ConfigManager {
    /// Loads and validates settings from `config_dir`, or the default directory.
    pub fn new(config_dir: Option<PathBuf>, env_override: Option<String>) -> Result<Self> {
        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let config_dir = config_dir.unwrap_or_else(Self::default_config_dir);
        let settings = Self::load_from_sources(&config_dir, &env_name)?;
        settings.validate()?;
        info!(
            "Loaded configuration for env '{}' from {:?}",
            env_name, config_dir
        );
        Ok(Self {
            settings,
            config_dir,
            env: env_name,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Get the default configuration directory.
    ///
    /// Priority order:
    /// 1. ~/.formflow/
    /// 2. ./config/
    /// 3. Current directory
    pub fn default_config_dir() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let user_dir = home_dir.join(".formflow");
            if user_dir.exists() {
                return user_dir;
            }
        }

        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            return project_config;
        }

        cwd
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                cfg::Environment::with_prefix("FORMFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }
}
