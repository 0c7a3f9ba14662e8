//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use maprest::cache::TileCacheError;
use maprest::config::ConfigFileError;
use maprest::engine::{EngineError, ReplyError};
use maprest::service::ServiceError;
use std::fmt;
use std::process;
use std::time::Duration;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or written
    Config(ConfigFileError),
    /// Invalid command-line argument
    InvalidArgument(String),
    /// Failed to start the engine
    Engine(EngineError),
    /// Failed to start the service
    Service(ServiceError),
    /// Tile cache operation failed
    Cache(TileCacheError),
    /// The engine refused the request
    Refused { url: String, reason: String },
    /// The request completed with an error
    Request { url: String, error: ReplyError },
    /// No reply arrived in time
    TimedOut { url: String, waited: Duration },
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Refused { .. } => {
                eprintln!();
                eprintln!("The engine refuses requests when it is shutting down or when");
                eprintln!("max_pending_requests is reached. Check the [engine] section of:");
                eprintln!("  {}", maprest::config::config_file_path().display());
            }
            CliError::Request {
                error: ReplyError::Communication(_),
                ..
            } => {
                eprintln!();
                eprintln!("Retries for timeouts and 5xx responses can be enabled with");
                eprintln!("max_retries in the [engine] section.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Engine(e) => write!(f, "Failed to start engine: {}", e),
            CliError::Service(e) => write!(f, "Failed to start service: {}", e),
            CliError::Cache(e) => write!(f, "Tile cache error: {}", e),
            CliError::Refused { url, reason } => {
                write!(f, "Request for '{}' was refused: {}", url, reason)
            }
            CliError::Request { url, error } => write!(f, "Request for '{}' failed: {}", url, error),
            CliError::TimedOut { url, waited } => write!(
                f,
                "No reply for '{}' after {:.1}s",
                url,
                waited.as_secs_f64()
            ),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Engine(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::Request { error, .. } => Some(error),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<TileCacheError> for CliError {
    fn from(e: TileCacheError) -> Self {
        CliError::Cache(e)
    }
}
