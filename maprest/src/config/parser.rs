//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::clamp_worker_threads;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [engine] section
    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("worker_threads") {
            let threads: usize = parse_number("engine", "worker_threads", v, "a positive integer")?;
            config.engine.worker_threads = clamp_worker_threads(threads);
        }
        if let Some(v) = section.get("request_timeout") {
            let secs: u64 = parse_number("engine", "request_timeout", v, "a positive integer (seconds)")?;
            if secs == 0 {
                return Err(invalid("engine", "request_timeout", v, "must be greater than zero"));
            }
            config.engine.request_timeout = secs;
        }
        if let Some(v) = section.get("max_pending_requests") {
            let max: usize = parse_number("engine", "max_pending_requests", v, "a positive integer")?;
            if max == 0 {
                return Err(invalid("engine", "max_pending_requests", v, "must be greater than zero"));
            }
            config.engine.max_pending_requests = max;
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                config.engine.user_agent = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("max_retries") {
            config.engine.max_retries = parse_number("engine", "max_retries", v, "a non-negative integer")?;
        }
        if let Some(v) = section.get("retry_delay_ms") {
            config.engine.retry_delay_ms =
                parse_number("engine", "retry_delay_ms", v, "a non-negative integer (milliseconds)")?;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("disk_size") {
            let size = parse_size(v).map_err(|_| {
                invalid("cache", "disk_size", v, "expected format like '64MB', '1GB', or '512KB'")
            })?;
            if size == 0 {
                return Err(invalid("cache", "disk_size", v, "must be greater than zero"));
            }
            config.cache.disk_size = size;
        }
        if let Some(v) = section.get("max_entries") {
            let max: usize = parse_number("cache", "max_entries", v, "a positive integer")?;
            if max == 0 {
                return Err(invalid("cache", "max_entries", v, "must be greater than zero"));
            }
            config.cache.max_entries = max;
        }
        if let Some(v) = section.get("rebuild_index") {
            config.cache.rebuild_index = parse_bool(v);
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    expected: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, &format!("must be {}", expected)))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
