//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use crate::cache::TileCacheConfig;
use crate::engine::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    /// Request engine settings
    pub engine: EngineSettings,
    /// Tile cache settings
    pub cache: CacheSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Worker thread count, clamped to 1..=64
    pub worker_threads: usize,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
    /// Registry capacity; further requests are refused
    pub max_pending_requests: usize,
    /// Custom User-Agent header
    pub user_agent: Option<String>,
    /// Retries for transient failures (0 disables)
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub retry_delay_ms: u64,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Tile directory
    pub directory: PathBuf,
    /// Maximum total tile size in bytes
    pub disk_size: u64,
    /// Maximum number of tiles
    pub max_entries: usize,
    /// Adopt tiles from a previous run on startup
    pub rebuild_index: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for the log file
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        let config = EngineConfig::default()
            .with_worker_threads(settings.worker_threads)
            .with_timeout(Duration::from_secs(settings.request_timeout))
            .with_max_pending_requests(settings.max_pending_requests)
            .with_retries(
                settings.max_retries,
                Duration::from_millis(settings.retry_delay_ms),
            );
        match &settings.user_agent {
            Some(agent) => config.with_user_agent(agent.clone()),
            None => config,
        }
    }
}

impl From<&CacheSettings> for TileCacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        TileCacheConfig::new(settings.directory.clone())
            .with_capacity_bytes(settings.disk_size)
            .with_capacity_count(settings.max_entries)
            .with_rebuild_index(settings.rebuild_index)
    }
}

impl From<&ConfigFile> for EngineConfig {
    fn from(config: &ConfigFile) -> Self {
        EngineConfig::from(&config.engine)
    }
}

impl From<&ConfigFile> for TileCacheConfig {
    fn from(config: &ConfigFile) -> Self {
        TileCacheConfig::from(&config.cache)
    }
}
