//! Service error types.

use crate::cache::TileCacheError;
use crate::engine::EngineError;
use thiserror::Error;

/// Errors that can occur while constructing the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Engine could not be started
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Tile cache could not be opened
    #[error("Cache error: {0}")]
    Cache(#[from] TileCacheError),
}
