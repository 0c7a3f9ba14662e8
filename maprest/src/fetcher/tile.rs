//! Cache-first tile loading.

use super::error::TileFetcherError;
use crate::cache::{TileCache, TileHash};
use crate::engine::{
    EngineError, ListenerBinding, ReplyError, ReplySink, RequestId, RequestListener, RestEngine,
};
use crate::transport::{TransportRequest, TransportResponse};
use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Identifies one tile to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Fully formed tile URL
    pub url: String,
    /// Content hash from the meta query; `None` bypasses the cache
    pub hash: Option<TileHash>,
}

impl TileKey {
    pub fn new(url: impl Into<String>, hash: TileHash) -> Self {
        Self {
            url: url.into(),
            hash: Some(hash),
        }
    }

    /// A tile whose hash is not known; always fetched, never cached.
    pub fn uncached(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hash: None,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hash {
            Some(hash) => write!(f, "{} [{}]", self.url, hash),
            None => write!(f, "{} [no hash]", self.url),
        }
    }
}

/// Reply sink that stores accepted network tiles in the cache.
///
/// Wraps the caller's sink and exposes it through `as_any`, so listeners
/// downcast a [`Reply`](crate::engine::Reply) to their own sink type as
/// usual. A body the caller's sink rejects is not cached.
struct CachingSink {
    inner: Box<dyn ReplySink>,
    cache: Arc<TileCache>,
    hash: TileHash,
}

impl ReplySink for CachingSink {
    fn on_data_received(&mut self, data: Bytes) -> bool {
        let accepted = self.inner.on_data_received(data.clone());
        if !accepted {
            debug!(hash = %self.hash, "Tile rejected by reply sink, not caching");
            return false;
        }
        if data.is_empty() {
            return true;
        }
        if self.cache.write(self.hash, &data) == 0 {
            // Logged by the cache; the next load simply misses.
            trace!(hash = %self.hash, "Tile not cached");
        }
        true
    }

    fn on_error(&mut self, error: &ReplyError) {
        self.inner.on_error(error);
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }
}

/// Loads tiles from the disk cache, falling back to the network.
///
/// Cache hits are still delivered through the engine's dispatcher, so
/// listeners see hits and network results on the same thread.
pub struct TileFetcher {
    engine: Arc<RestEngine>,
    cache: Arc<TileCache>,
}

impl TileFetcher {
    pub fn new(engine: Arc<RestEngine>, cache: Arc<TileCache>) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<RestEngine> {
        &self.engine
    }

    /// Loads a tile, returning [`RequestId::INVALID`] if the engine refuses.
    pub fn load<L, S>(&self, key: &TileKey, listener: &Arc<L>, sink: S) -> RequestId
    where
        L: RequestListener + 'static,
        S: ReplySink,
    {
        self.try_load(key, Some(ListenerBinding::new(listener)), Box::new(sink))
            .unwrap_or(RequestId::INVALID)
    }

    /// Loads a tile.
    ///
    /// On a cache hit the cached bytes are delivered without a network call.
    /// On a miss the tile is fetched and written to the cache once the
    /// caller's sink accepted it. Keys without a hash skip the cache.
    pub fn try_load(
        &self,
        key: &TileKey,
        listener: Option<ListenerBinding>,
        sink: Box<dyn ReplySink>,
    ) -> Result<RequestId, TileFetcherError> {
        let request = TransportRequest::get(key.url.as_str());

        let Some(hash) = key.hash else {
            trace!(url = %key.url, "Tile has no hash, bypassing cache");
            return self.engine.submit(request, listener, sink).map_err(refused);
        };

        match self.cached(hash) {
            Ok(data) => {
                trace!(hash = %hash, "Tile cache hit");
                let response = TransportResponse::ok(data);
                self.engine
                    .complete_locally(request, listener, sink, Ok(response))
                    .map_err(refused)
            }
            Err(_) => {
                let sink = Box::new(CachingSink {
                    inner: sink,
                    cache: Arc::clone(&self.cache),
                    hash,
                });
                self.engine.submit(request, listener, sink).map_err(refused)
            }
        }
    }

    /// Loads a tile from the cache only.
    ///
    /// A key without a hash fails synchronously. A miss is delivered to the
    /// listener as a failure, like any other result.
    pub fn try_load_cached(
        &self,
        key: &TileKey,
        listener: Option<ListenerBinding>,
        sink: Box<dyn ReplySink>,
    ) -> Result<RequestId, TileFetcherError> {
        let hash = key.hash.ok_or_else(|| TileFetcherError::HashUnavailable {
            url: key.url.clone(),
        })?;

        let result = self
            .cached(hash)
            .map(TransportResponse::ok)
            .map_err(ReplyError::from);
        self.engine
            .complete_locally(TransportRequest::get(key.url.as_str()), listener, sink, result)
            .map_err(refused)
    }

    /// Reads a usable tile from the cache.
    ///
    /// An empty cached file is dropped from the cache and reported as
    /// undecodable.
    fn cached(&self, hash: TileHash) -> Result<Bytes, TileFetcherError> {
        let data = self
            .cache
            .read(hash)
            .ok_or(TileFetcherError::NotCached { hash })?;
        if data.is_empty() {
            warn!(hash = %hash, "Cached tile is empty, removing");
            self.cache.remove(hash);
            return Err(TileFetcherError::Undecodable {
                hash,
                reason: "empty payload".to_string(),
            });
        }
        Ok(data)
    }
}

fn refused(error: EngineError) -> TileFetcherError {
    TileFetcherError::Refused {
        reason: error.to_string(),
    }
}
