//! Tile file naming.
//!
//! Every tile lives in a single flat directory:
//!
//! ```text
//! <cache_dir>/<hash as 8 hex digits>.tile
//! ```

use super::types::TileHash;
use std::path::{Path, PathBuf};

/// Extension of tile files.
pub const TILE_EXTENSION: &str = "tile";

/// File name for a tile hash.
///
/// # Example
///
/// ```
/// use maprest::cache::{tile_filename, TileHash};
///
/// assert_eq!(tile_filename(TileHash(0x1a2b)), "00001a2b.tile");
/// ```
pub fn tile_filename(hash: TileHash) -> String {
    format!("{}.{}", hash, TILE_EXTENSION)
}

/// Full path of a tile file inside the cache directory.
pub fn tile_path(cache_dir: &Path, hash: TileHash) -> PathBuf {
    cache_dir.join(tile_filename(hash))
}

/// Recovers the hash from a tile file name.
///
/// Returns `None` for anything that [`tile_filename`] would not produce.
pub fn parse_tile_filename(filename: &str) -> Option<TileHash> {
    let stem = filename.strip_suffix(TILE_EXTENSION)?.strip_suffix('.')?;
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(stem, 16).ok().map(TileHash)
}
