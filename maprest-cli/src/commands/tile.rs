//! `tile` - load one map tile through the disk cache.

use clap::Args;
use maprest::cache::TileHash;
use maprest::config::ConfigFile;
use maprest::engine::{BufferReply, EngineConfig, ListenerBinding};
use maprest::fetcher::TileKey;
use maprest::service::MapService;
use std::path::PathBuf;

use super::common::{reply_deadline, wait_for_reply, write_body, ReplyChannel};
use crate::error::CliError;

/// Arguments for `maprest tile`.
#[derive(Debug, Args)]
pub struct TileArgs {
    /// Fully formed tile URL
    pub url: String,

    /// Tile content hash in hex (e.g. 1f2e3d4c); omit to bypass the cache
    #[arg(long)]
    pub hash: Option<String>,

    /// Only look in the cache, never touch the network
    #[arg(long, requires = "hash")]
    pub cache_only: bool,

    /// Write the tile to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the tile command.
pub fn run(args: TileArgs, config: &ConfigFile) -> Result<(), CliError> {
    let key = match &args.hash {
        Some(text) => {
            let hash: TileHash = text.parse().map_err(|_| {
                CliError::InvalidArgument(format!("'{}' is not a hexadecimal tile hash", text))
            })?;
            TileKey::new(args.url.as_str(), hash)
        }
        None => TileKey::uncached(args.url.as_str()),
    };

    let deadline = reply_deadline(&EngineConfig::from(config));
    let service = MapService::from_config(config)?;
    let (listener, rx) = ReplyChannel::new();

    let id = if args.cache_only {
        service
            .fetcher()
            .try_load_cached(
                &key,
                Some(ListenerBinding::new(&listener)),
                Box::new(BufferReply::new()),
            )
            .map_err(|e| CliError::Refused {
                url: args.url.clone(),
                reason: e.to_string(),
            })?
    } else {
        service.load_tile(&key, &listener, BufferReply::new())
    };
    if !id.is_valid() {
        return Err(CliError::Refused {
            url: args.url,
            reason: "engine did not accept the request".to_string(),
        });
    }

    let completed = wait_for_reply(&args.url, &rx, deadline)?;
    service.shutdown();

    let origin = if completed.from_cache { "cache" } else { "network" };
    eprintln!("{} ({} bytes from {})", key, completed.body.len(), origin);
    write_body(&completed.body, args.output.as_deref())
}
