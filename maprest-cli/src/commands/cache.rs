//! Cache management CLI commands.

use clap::Subcommand;
use maprest::cache::{TileCache, TileCacheConfig};
use maprest::config::{format_size, ConfigFile};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear the tile cache, removing all cached tiles
    Clear,
    /// Show tile cache statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config: &ConfigFile) -> Result<(), CliError> {
    let cache_config = TileCacheConfig::from(config);

    match action {
        CacheAction::Clear => {
            println!("Clearing tile cache at: {}", cache_config.directory.display());
            // Stray files are removed by clear, so the index need not be rebuilt.
            let cache = TileCache::open(cache_config.with_rebuild_index(false))?;
            let removed = cache.clear()?;
            println!("Deleted {} tiles", removed);
            Ok(())
        }
        CacheAction::Stats => {
            let cache = TileCache::open(cache_config.with_rebuild_index(true))?;
            let config = cache.config();
            println!("Tile cache: {}", config.directory.display());
            println!(
                "  Tiles: {} / {}",
                cache.entry_count(),
                config.capacity_count
            );
            println!(
                "  Size:  {} / {}",
                format_size(cache.size_bytes()),
                format_size(config.capacity_bytes)
            );
            Ok(())
        }
    }
}
