//! User configuration for maprest.
//!
//! Settings are read from `~/.maprest/config.ini` and converted into the
//! component configs ([`EngineConfig`](crate::engine::EngineConfig),
//! [`TileCacheConfig`](crate::cache::TileCacheConfig)) through `From`.
//!
//! # Example
//!
//! ```
//! use maprest::config::ConfigFile;
//! use maprest::engine::EngineConfig;
//!
//! let config = ConfigFile::default();
//! let engine = EngineConfig::from(&config);
//! assert_eq!(engine.worker_threads, 8);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, ConfigFile, EngineSettings, LoggingSettings};
pub use size::{format_size, parse_size, SizeParseError};
