//! High-level service facade for maprest.
//!
//! [`MapService`] wires the request engine, the tile cache and the tile
//! fetcher together and owns their lifetime.

mod error;
mod facade;

pub use error::ServiceError;
pub use facade::MapService;
