//! Tile fetching through the disk cache.
//!
//! [`TileFetcher::load`] checks the [`TileCache`](crate::cache::TileCache)
//! by content hash before any request is created. Hits short-circuit to a
//! synthetic completion on the dispatcher thread; misses go to the network
//! and are written back once the caller's sink accepted the body.

mod error;
mod tile;

pub use error::TileFetcherError;
pub use tile::{TileFetcher, TileKey};
