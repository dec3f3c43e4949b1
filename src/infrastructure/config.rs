//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (every struct is `#[serde(default)]`)
//! 2. Optional TOML file (`$HARVEST_CONFIG` or the per-user config dir)
//! 3. Environment variables `HARVEST__SECTION__KEY`

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";

/// Prefix for per-key environment overrides
pub const ENV_PREFIX: &str = "HARVEST";

const APP_DIR_NAME: &str = "product-harvest";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub marketplace: MarketplaceConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    /// First port tried; the next ones are probed when it is taken
    pub port: u16,

    /// How many consecutive ports to try before giving up
    pub port_search_attempts: u16,
}

/// Upstream marketplace API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub api_base_url: String,

    /// Site identifier used in `/sites/{site_id}/search`
    pub site_id: String,

    pub user_agent: String,

    pub accept_language: String,

    /// Process-wide request rate limit; 0 disables limiting
    pub max_requests_per_second: u32,

    pub accept_invalid_certs: bool,
}

/// Fetch / enrich / persist pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Window size used when the caller does not ask for a batch count
    pub batch_size: u64,

    /// Maximum concurrent search-window fetches per job
    pub fetch_concurrency: usize,

    /// Maximum concurrent enrichment probes per job
    pub enrichment_concurrency: usize,

    /// Timeout applied to every upstream call
    pub request_timeout_secs: u64,

    /// Delay an enrichment worker holds its slot after each probe
    pub enrichment_delay_ms: u64,

    /// Optional ceiling on in-flight network calls across all jobs
    pub global_max_in_flight: Option<usize>,

    /// Records written per transaction
    pub persist_chunk_size: usize,

    pub cache_capacity: usize,

    pub cache_ttl_secs: u64,

    /// Try `/items/{id}` before scraping the product page
    pub use_item_api: bool,
}

/// SQLite connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory the log file is written to
    pub log_dir: PathBuf,

    pub file_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            port_search_attempts: defaults::PORT_SEARCH_ATTEMPTS,
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::API_BASE_URL.to_string(),
            site_id: defaults::SITE_ID.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            accept_invalid_certs: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            fetch_concurrency: defaults::FETCH_CONCURRENCY,
            enrichment_concurrency: defaults::ENRICHMENT_CONCURRENCY,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            enrichment_delay_ms: defaults::ENRICHMENT_DELAY_MS,
            global_max_in_flight: None,
            persist_chunk_size: defaults::PERSIST_CHUNK_SIZE,
            cache_capacity: defaults::CACHE_CAPACITY,
            cache_ttl_secs: defaults::CACHE_TTL_SECS,
            use_item_api: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            file_name: defaults::LOG_FILE_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn enrichment_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_delay_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    /// Loads configuration from the default file location plus environment
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path();
        Self::load_from(path.as_deref())
    }

    /// Loads configuration from an explicit (optional) file plus environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading configuration file: {}", path.display());
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// `$HARVEST_CONFIG`, else `<config dir>/product-harvest/config.toml`
    #[must_use]
    pub fn config_file_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            if !explicit.trim().is_empty() {
                return Some(PathBuf::from(explicit));
            }
        }
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
    }

    /// Rejects settings that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.batch_size == 0 {
            bail!("pipeline.batch_size must be greater than zero");
        }
        if pipeline.fetch_concurrency == 0 {
            bail!("pipeline.fetch_concurrency must be greater than zero");
        }
        if pipeline.enrichment_concurrency == 0 {
            bail!("pipeline.enrichment_concurrency must be greater than zero");
        }
        if pipeline.persist_chunk_size == 0 {
            bail!("pipeline.persist_chunk_size must be greater than zero");
        }
        if pipeline.request_timeout_secs == 0 {
            bail!("pipeline.request_timeout_secs must be greater than zero");
        }
        if pipeline.global_max_in_flight == Some(0) {
            bail!("pipeline.global_max_in_flight must be greater than zero when set");
        }
        if self.server.port_search_attempts == 0 {
            bail!("server.port_search_attempts must be greater than zero");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be greater than zero");
        }
        Ok(())
    }
}

/// Per-user data directory for the SQLite file
#[must_use]
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_database_url() -> String {
    format!("sqlite://{}", app_data_dir().join("products.db").display())
}

/// Default configuration values
pub mod defaults {
    pub const SERVER_HOST: &str = "127.0.0.1";

    pub const SERVER_PORT: u16 = 5000;

    pub const PORT_SEARCH_ATTEMPTS: u16 = 10;

    pub const API_BASE_URL: &str = "https://api.mercadolibre.com";

    /// Mexico
    pub const SITE_ID: &str = "MLM";

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    pub const ACCEPT_LANGUAGE: &str = "es-MX,es;q=0.9,en;q=0.8";

    pub const MAX_REQUESTS_PER_SECOND: u32 = 0;

    /// Upstream search pages hold at most 50 results
    pub const BATCH_SIZE: u64 = 50;

    pub const FETCH_CONCURRENCY: usize = 10;

    pub const ENRICHMENT_CONCURRENCY: usize = 10;

    pub const REQUEST_TIMEOUT_SECS: u64 = 10;

    pub const ENRICHMENT_DELAY_MS: u64 = 150;

    pub const PERSIST_CHUNK_SIZE: usize = 100;

    pub const CACHE_CAPACITY: usize = 256;

    pub const CACHE_TTL_SECS: u64 = 300;

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_FILE_NAME: &str = "product_harvest.log";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.marketplace.site_id, "MLM");
        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.fetch_concurrency, 10);
        assert_eq!(config.pipeline.enrichment_delay_ms, 150);
        assert_eq!(config.pipeline.global_max_in_flight, None);
        assert!(config.database.url.starts_with("sqlite://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_file_overrides_only_named_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[pipeline]\nfetch_concurrency = 3\nglobal_max_in_flight = 16\n"
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path())).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, defaults::SERVER_HOST);
        assert_eq!(config.pipeline.fetch_concurrency, 3);
        assert_eq!(config.pipeline.global_max_in_flight, Some(16));
        assert_eq!(config.pipeline.enrichment_concurrency, defaults::ENRICHMENT_CONCURRENCY);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(config.pipeline.batch_size, defaults::BATCH_SIZE);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.enrichment_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.global_max_in_flight = Some(0);
        assert!(config.validate().is_err());
    }
}
