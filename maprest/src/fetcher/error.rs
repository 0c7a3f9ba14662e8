//! Tile fetcher errors.

use crate::cache::TileHash;
use thiserror::Error;

/// Tile-specific failure, delivered to listeners as
/// [`ReplyError::TileFetcher`](crate::engine::ReplyError::TileFetcher) or
/// returned synchronously by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileFetcherError {
    /// The tile has no content hash yet, so the cache cannot be consulted
    #[error("Tile hash unavailable for {url}")]
    HashUnavailable { url: String },

    /// The tile is not in the cache (cache-only loads)
    #[error("Tile {hash} is not cached")]
    NotCached { hash: TileHash },

    /// The cached payload is unusable
    #[error("Tile {hash} could not be decoded: {reason}")]
    Undecodable { hash: TileHash, reason: String },

    /// The engine refused the request (backpressure or shutdown)
    #[error("Tile request refused: {reason}")]
    Refused { reason: String },
}
