//! maprest service facade implementation.

use super::error::ServiceError;
use crate::cache::{TileCache, TileCacheConfig};
use crate::config::ConfigFile;
use crate::engine::{EngineConfig, ReplySink, RequestId, RequestListener, RestEngine};
use crate::fetcher::{TileFetcher, TileKey};
use crate::transport::Transport;
use std::sync::Arc;
use tracing::info;

/// Owner of the request engine, the tile cache and the tile fetcher.
///
/// Construct one at application start, hand out references to whatever
/// issues queries, and call [`shutdown`](Self::shutdown) before exit.
/// Dropping the service shuts it down as well.
///
/// # Example
///
/// ```no_run
/// use maprest::config::ConfigFile;
/// use maprest::service::MapService;
///
/// let config = ConfigFile::load()?;
/// let service = MapService::from_config(&config)?;
/// println!("{} tiles cached", service.cache().entry_count());
/// service.shutdown();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MapService {
    engine: Arc<RestEngine>,
    cache: Arc<TileCache>,
    fetcher: TileFetcher,
}

impl MapService {
    /// Creates a service backed by the reqwest transport.
    pub fn new(
        engine_config: EngineConfig,
        cache_config: TileCacheConfig,
    ) -> Result<Self, ServiceError> {
        let cache = TileCache::open(cache_config)?;
        let engine = RestEngine::new(engine_config)?;
        Ok(Self::assemble(engine, cache))
    }

    /// Creates a service with a custom transport.
    pub fn with_transport(
        engine_config: EngineConfig,
        cache_config: TileCacheConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ServiceError> {
        let cache = TileCache::open(cache_config)?;
        let engine = RestEngine::with_transport(engine_config, transport)?;
        Ok(Self::assemble(engine, cache))
    }

    /// Creates a service from a loaded config file.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ServiceError> {
        Self::new(EngineConfig::from(config), TileCacheConfig::from(config))
    }

    fn assemble(engine: RestEngine, cache: TileCache) -> Self {
        let engine = Arc::new(engine);
        let cache = Arc::new(cache);
        let fetcher = TileFetcher::new(Arc::clone(&engine), Arc::clone(&cache));
        info!(
            cache_dir = %cache.directory().display(),
            cached_tiles = cache.entry_count(),
            "Map service started"
        );
        Self {
            engine,
            cache,
            fetcher,
        }
    }

    pub fn engine(&self) -> &Arc<RestEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn fetcher(&self) -> &TileFetcher {
        &self.fetcher
    }

    /// Loads a tile through the cache. See [`TileFetcher::load`].
    pub fn load_tile<L, S>(&self, key: &TileKey, listener: &Arc<L>, sink: S) -> RequestId
    where
        L: RequestListener + 'static,
        S: ReplySink,
    {
        self.fetcher.load(key, listener, sink)
    }

    /// Stops the engine. Pending requests are aborted without notification.
    ///
    /// Idempotent. The cache stays readable afterwards.
    pub fn shutdown(&self) {
        if self.engine.is_shut_down() {
            return;
        }
        self.engine.shutdown();

        let stats = self.cache.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            writes = stats.writes,
            evictions = stats.evictions,
            "Map service shut down"
        );
    }
}

impl Drop for MapService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
