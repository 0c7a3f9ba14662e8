//! Core types for the tile cache.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default cache capacity in bytes (64 MB).
pub const DEFAULT_CAPACITY_BYTES: u64 = 64 * 1024 * 1024;

/// Default maximum number of cached tiles.
pub const DEFAULT_CAPACITY_COUNT: usize = 4096;

/// Server-provided content hash identifying one tile payload.
///
/// The hash comes from the map meta query and cannot be derived from tile
/// coordinates. It is also the cache key and the file name on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileHash(pub u32);

impl TileHash {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for TileHash {
    type Err = std::num::ParseIntError;

    /// Parses a hexadecimal hash, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).map(TileHash)
    }
}

/// Index record for one cached tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheEntry {
    pub hash: TileHash,
    /// Payload size on disk
    pub size_bytes: u64,
    /// Number of cache reads that returned this tile
    pub hit_count: u64,
    /// Access tick of the last write or read; higher is more recent
    pub last_access: u64,
}

/// Tile cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCacheConfig {
    /// Directory holding one file per tile
    pub directory: PathBuf,
    /// Maximum total payload size (default: 64 MB)
    pub capacity_bytes: u64,
    /// Maximum number of tiles (default: 4096)
    pub capacity_count: usize,
    /// Adopt tiles left on disk by a previous run (default: true)
    pub rebuild_index: bool,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            capacity_count: DEFAULT_CAPACITY_COUNT,
            rebuild_index: true,
        }
    }
}

impl TileCacheConfig {
    /// Create a configuration for the given directory with default limits.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    pub fn with_capacity_count(mut self, count: usize) -> Self {
        self.capacity_count = count;
        self
    }

    pub fn with_rebuild_index(mut self, rebuild: bool) -> Self {
        self.rebuild_index = rebuild;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), TileCacheError> {
        if self.capacity_bytes == 0 {
            return Err(TileCacheError::InvalidConfig(
                "capacity_bytes must be greater than zero".to_string(),
            ));
        }
        if self.capacity_count == 0 {
            return Err(TileCacheError::InvalidConfig(
                "capacity_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<platform cache dir>/maprest/tiles`, or `./maprest/tiles` if unknown.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maprest")
        .join("tiles")
}

/// Tile cache errors.
///
/// Only construction and `clear` report these; reads and writes degrade to
/// a cache miss instead.
#[derive(Debug, Error)]
pub enum TileCacheError {
    /// I/O error during cache operations
    #[error("Tile cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid cache configuration
    #[error("Invalid tile cache configuration: {0}")]
    InvalidConfig(String),
}
