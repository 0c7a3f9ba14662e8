//! Default values for all configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::cache::{default_cache_directory, DEFAULT_CAPACITY_BYTES, DEFAULT_CAPACITY_COUNT};
use crate::engine::{
    DEFAULT_MAX_PENDING_REQUESTS, DEFAULT_RETRY_DELAY_MS, DEFAULT_WORKER_THREADS,
    MAX_WORKER_THREADS,
};
use crate::transport::DEFAULT_TIMEOUT_SECS;

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "maprest.log";

/// Clamps the worker count and logs a warning if it was out of range.
pub(super) fn clamp_worker_threads(value: usize) -> usize {
    let clamped = value.clamp(1, MAX_WORKER_THREADS);
    if clamped != value {
        tracing::warn!(
            requested = value,
            min = 1,
            max = MAX_WORKER_THREADS,
            "worker_threads out of range, clamping to {}",
            clamped
        );
    }
    clamped
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            request_timeout: DEFAULT_TIMEOUT_SECS,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            user_agent: None,
            max_retries: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            disk_size: DEFAULT_CAPACITY_BYTES,
            max_entries: DEFAULT_CAPACITY_COUNT,
            rebuild_index: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIR),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
