//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let user_agent = config.engine.user_agent.as_deref().unwrap_or("");
    let rebuild_index = if config.cache.rebuild_index {
        "true"
    } else {
        "false"
    };

    format!(
        r#"[engine]
; Number of worker threads executing HTTP requests (1-64, default: 8)
worker_threads = {}
; Per-request timeout in seconds (default: 20)
request_timeout = {}
; Maximum number of requests in flight; further requests are refused (default: 256)
max_pending_requests = {}
; User-Agent header sent with every request (empty = client default)
user_agent = {}
; Retries for timeouts, connection failures, 429 and 5xx responses (0 = never retry)
max_retries = {}
; Delay before the first retry in milliseconds, doubled for each further attempt
retry_delay_ms = {}

[cache]
; Directory holding cached tiles, one <hash>.tile file per tile
; If empty, defaults to the platform cache directory
directory = {}
; Maximum total size of cached tiles (default: 64MB)
; Supports: KB, MB, GB suffixes (e.g., 512KB, 64MB, 1GB)
disk_size = {}
; Maximum number of cached tiles (default: 4096)
max_entries = {}
; Re-index tiles left by a previous run on startup (default: true)
rebuild_index = {}

[logging]
; Directory for the log file
directory = {}
; Log file name
file = {}
"#,
        config.engine.worker_threads,
        config.engine.request_timeout,
        config.engine.max_pending_requests,
        user_agent,
        config.engine.max_retries,
        config.engine.retry_delay_ms,
        path_to_string(&config.cache.directory),
        format_size(config.cache.disk_size),
        config.cache.max_entries,
        rebuild_index,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Convert a path to a string, collapsing the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
