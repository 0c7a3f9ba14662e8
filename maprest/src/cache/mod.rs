//! On-disk tile cache.
//!
//! Tiles are stored one file per content hash and tracked by an in-memory
//! index that enforces a byte capacity and an entry-count capacity with
//! least-recently-used eviction.

mod disk;
mod index;
mod path;
mod stats;
mod types;

pub use disk::{PopulateStats, TileCache};
pub use index::TileIndex;
pub use path::{parse_tile_filename, tile_filename, tile_path, TILE_EXTENSION};
pub use stats::CacheStats;
pub use types::{
    default_cache_directory, TileCacheConfig, TileCacheEntry, TileCacheError, TileHash,
    DEFAULT_CAPACITY_BYTES, DEFAULT_CAPACITY_COUNT,
};
