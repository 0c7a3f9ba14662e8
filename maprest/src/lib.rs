//! maprest - asynchronous REST requests and tile caching for map clients
//!
//! This library provides the request engine behind geocoding, search, routing
//! and map tile queries: a bounded registry of in-flight requests, a pool of
//! worker threads executing them over HTTP, a single dispatcher thread
//! delivering results to listeners, and a size- and count-bounded disk cache
//! for map tiles.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```no_run
//! use maprest::cache::{TileCacheConfig, TileHash};
//! use maprest::engine::{BufferReply, EngineConfig, Reply, RequestListener};
//! use maprest::fetcher::TileKey;
//! use maprest::service::MapService;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl RequestListener for Printer {
//!     fn notify_for_success(&self, reply: Arc<Reply>) {
//!         if let Some(buffer) = reply.sink_as::<BufferReply>() {
//!             println!("tile: {} bytes", buffer.data().len());
//!         }
//!     }
//!
//!     fn notify_for_failure(&self, reply: Arc<Reply>) {
//!         eprintln!("tile failed: {:?}", reply.error());
//!     }
//! }
//!
//! let service = MapService::new(
//!     EngineConfig::default(),
//!     TileCacheConfig::new("/tmp/maprest-tiles"),
//! )?;
//! let listener = Arc::new(Printer);
//! let key = TileKey::new("https://tiles.example.com/12/2200/1343", TileHash(0x1f2e3d4c));
//! service.load_tile(&key, &listener, BufferReply::new());
//! service.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod logging;
pub mod service;
pub mod transport;

/// Version of the maprest library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
