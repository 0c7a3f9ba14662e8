//! Disk-backed tile cache with capacity-bounded eviction.

use super::index::TileIndex;
use super::path::{parse_tile_filename, tile_path, TILE_EXTENSION};
use super::stats::CacheStats;
use super::types::{TileCacheConfig, TileCacheEntry, TileCacheError, TileHash};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Index and counters, guarded together.
struct CacheState {
    index: TileIndex,
    stats: CacheStats,
}

impl CacheState {
    fn sync_size(&mut self) {
        let (bytes, count) = (self.index.total_bytes(), self.index.len());
        self.stats.update_size(bytes, count);
    }
}

/// Statistics from adopting tiles already on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PopulateStats {
    pub files_indexed: u64,
    /// Files in the directory whose name is not a tile hash
    pub skipped: u64,
    pub total_bytes: u64,
    /// Tiles evicted right away because the directory was over capacity
    pub evicted: u64,
}

/// Persistent tile store keyed by [`TileHash`].
///
/// One file per tile in a flat directory. The in-memory index is the source
/// of truth for what is cached: a tile is indexed only after its file was
/// written, and every write re-checks both capacity limits, evicting least
/// recently used tiles until they hold again.
///
/// Reads and writes never fail loudly. A failed write is logged and reported
/// as zero bytes written; a failed read is a miss.
pub struct TileCache {
    config: TileCacheConfig,
    state: Mutex<CacheState>,
}

impl TileCache {
    /// Opens the cache, creating the directory if needed.
    ///
    /// With `rebuild_index` set, tiles left by a previous run are adopted
    /// (oldest modification time first) and evicted down to capacity.
    pub fn open(config: TileCacheConfig) -> Result<Self, TileCacheError> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let cache = Self {
            config,
            state: Mutex::new(CacheState {
                index: TileIndex::new(),
                stats: CacheStats::new(),
            }),
        };

        if cache.config.rebuild_index {
            let populated = cache.populate_from_disk()?;
            info!(
                directory = %cache.config.directory.display(),
                files = populated.files_indexed,
                bytes = populated.total_bytes,
                evicted = populated.evicted,
                "Tile cache index rebuilt"
            );
        } else {
            debug!(directory = %cache.config.directory.display(), "Tile cache opened cold");
        }

        Ok(cache)
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Stores a tile and returns the number of bytes written.
    ///
    /// Returns 0 when the tile could not be stored: the file write failed or
    /// the tile alone exceeds the byte capacity. The tile is then not cached
    /// and the next load falls back to the network.
    pub fn write(&self, hash: TileHash, data: &[u8]) -> usize {
        let size = data.len() as u64;
        let mut state = self.state.lock();

        if size > self.config.capacity_bytes {
            state.stats.record_write_failure();
            warn!(
                hash = %hash,
                size,
                capacity = self.config.capacity_bytes,
                "Tile larger than cache capacity, not cached"
            );
            return 0;
        }

        let path = tile_path(&self.config.directory, hash);
        if let Err(e) = fs::write(&path, data) {
            state.stats.record_write_failure();
            warn!(hash = %hash, path = %path.display(), error = %e, "Tile cache write failed");
            // Whatever is left of the file cannot be trusted any more.
            if let Some(stale) = state.index.remove(hash) {
                self.delete_files(&[stale]);
                state.sync_size();
            } else {
                let _ = fs::remove_file(&path);
            }
            return 0;
        }

        state.index.insert(hash, size);
        state.stats.record_write();

        let victims = state
            .index
            .evict_to_fit(self.config.capacity_bytes, self.config.capacity_count);
        if !victims.is_empty() {
            self.delete_files(&victims);
            state.stats.record_evictions(victims.len() as u64);
            debug!(
                evicted = victims.len(),
                first = %victims[0].hash,
                "Tile cache evicted entries"
            );
        }
        state.sync_size();

        trace!(hash = %hash, size, "Tile cached");
        data.len()
    }

    /// Reads a tile, counting a hit on success.
    ///
    /// Returns `None` on a miss. A file that disappeared or cannot be read
    /// is dropped from the index and counted as a miss.
    pub fn read(&self, hash: TileHash) -> Option<Bytes> {
        let mut state = self.state.lock();
        if !state.index.contains(hash) {
            state.stats.record_miss();
            return None;
        }

        let path = tile_path(&self.config.directory, hash);
        match fs::read(&path) {
            Ok(data) => {
                state.index.touch(hash);
                state.stats.record_hit();
                Some(Bytes::from(data))
            }
            Err(e) => {
                warn!(hash = %hash, path = %path.display(), error = %e, "Cached tile unreadable, dropping");
                state.index.remove(hash);
                state.stats.record_miss();
                state.sync_size();
                None
            }
        }
    }

    /// Deletes one tile. Returns false if it was not cached.
    pub fn remove(&self, hash: TileHash) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.index.remove(hash) else {
            return false;
        };
        self.delete_files(&[entry]);
        state.stats.record_removal();
        state.sync_size();
        true
    }

    /// Deletes every cached tile, including tile files the index does not
    /// know about. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, TileCacheError> {
        let mut state = self.state.lock();
        let dropped = state.index.clear();
        state.sync_size();

        let mut removed = 0;
        for entry in fs::read_dir(&self.config.directory)? {
            let path = entry?.path();
            if is_tile_file(&path) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        info!(
            indexed = dropped.len(),
            removed,
            directory = %self.config.directory.display(),
            "Tile cache cleared"
        );
        Ok(removed)
    }

    pub fn contains(&self, hash: TileHash) -> bool {
        self.state.lock().index.contains(hash)
    }

    /// Index record for a tile, without counting a hit.
    pub fn entry(&self, hash: TileHash) -> Option<TileCacheEntry> {
        self.state.lock().index.get(hash)
    }

    /// All entries, next eviction victim first.
    pub fn entries(&self) -> Vec<TileCacheEntry> {
        self.state.lock().index.eviction_order()
    }

    pub fn size_bytes(&self) -> u64 {
        self.state.lock().index.total_bytes()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    /// Adopts tile files already present in the cache directory.
    ///
    /// Files are indexed oldest modification time first, so the recency
    /// order survives a restart. Evicts immediately if the directory holds
    /// more than the configured capacity.
    pub fn populate_from_disk(&self) -> Result<PopulateStats, TileCacheError> {
        let mut result = PopulateStats::default();
        let mut found: Vec<(SystemTime, TileHash, u64)> = Vec::new();

        for entry in fs::read_dir(&self.config.directory)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let hash = entry
                .file_name()
                .to_str()
                .and_then(parse_tile_filename);
            match hash {
                Some(hash) => {
                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((modified, hash, metadata.len()));
                }
                None => result.skipped += 1,
            }
        }

        found.sort();

        let mut state = self.state.lock();
        for (_, hash, size) in found {
            state.index.insert(hash, size);
            result.files_indexed += 1;
            result.total_bytes += size;
        }

        let victims = state
            .index
            .evict_to_fit(self.config.capacity_bytes, self.config.capacity_count);
        self.delete_files(&victims);
        result.evicted = victims.len() as u64;
        state.stats.record_evictions(result.evicted);
        state.sync_size();

        Ok(result)
    }

    fn delete_files(&self, entries: &[TileCacheEntry]) {
        for entry in entries {
            let path = tile_path(&self.config.directory, entry.hash);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(hash = %entry.hash, error = %e, "Failed to delete tile file");
                }
            }
        }
    }
}

fn is_tile_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TILE_EXTENSION)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_tile_filename)
            .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, bytes: u64, count: usize) -> TileCache {
        TileCache::open(
            TileCacheConfig::new(dir.path())
                .with_capacity_bytes(bytes)
                .with_capacity_count(count),
        )
        .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read / write
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);
        let hash = TileHash(0xabc);

        assert_eq!(cache.write(hash, b"tile-bytes"), 10);
        let hits_before = cache.entry(hash).unwrap().hit_count;

        let data = cache.read(hash).unwrap();

        assert_eq!(&data[..], b"tile-bytes");
        assert_eq!(cache.entry(hash).unwrap().hit_count, hits_before + 1);
        assert!(dir.path().join("00000abc.tile").exists());
    }

    #[test]
    fn test_read_miss() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);

        assert!(cache.read(TileHash(1)).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_overwrite_replaces_size() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);

        cache.write(TileHash(1), &[0u8; 100]);
        cache.write(TileHash(1), &[0u8; 30]);

        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), 30);
    }

    #[test]
    fn test_write_failure_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);
        // A directory where the tile file should go makes the write fail.
        fs::create_dir(dir.path().join("00000007.tile")).unwrap();

        assert_eq!(cache.write(TileHash(7), b"data"), 0);
        assert!(!cache.contains(TileHash(7)));
        assert_eq!(cache.stats().write_failures, 1);
    }

    #[test]
    fn test_oversized_tile_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 10, 16);

        assert_eq!(cache.write(TileHash(1), &[0u8; 11]), 0);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_vanished_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);
        cache.write(TileHash(5), b"data");
        fs::remove_file(dir.path().join("00000005.tile")).unwrap();

        assert!(cache.read(TileHash(5)).is_none());
        assert!(!cache.contains(TileHash(5)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Eviction
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_eviction_by_size_removes_least_recent() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 100, 16);

        cache.write(TileHash(1), &[1u8; 40]);
        cache.write(TileHash(2), &[2u8; 40]);
        cache.read(TileHash(1));
        cache.write(TileHash(3), &[3u8; 40]);

        assert!(cache.contains(TileHash(1)));
        assert!(!cache.contains(TileHash(2)));
        assert!(cache.contains(TileHash(3)));
        assert!(cache.size_bytes() <= 100);
        assert!(!dir.path().join("00000002.tile").exists());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_by_count() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 2);

        for n in 1..=4 {
            cache.write(TileHash(n), b"x");
        }

        assert_eq!(cache.entry_count(), 2);
        assert!(cache.contains(TileHash(3)));
        assert!(cache.contains(TileHash(4)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remove / clear
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir, 1024, 16);
        cache.write(TileHash(1), b"x");

        assert!(cache.remove(TileHash(1)));
        assert!(!cache.remove(TileHash(1)));
        assert!(!dir.path().join("00000001.tile").exists());
    }

    #[test]
    fn test_clear_removes_files_and_strays() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0000beef.tile"), b"old").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        let cache = TileCache::open(
            TileCacheConfig::new(dir.path()).with_rebuild_index(false),
        )
        .unwrap();
        cache.write(TileHash(1), b"x");

        let removed = cache.clear().unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.entry_count(), 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rebuild
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_rebuild_adopts_existing_tiles() {
        let dir = TempDir::new().unwrap();
        {
            let cache = open(&dir, 1024, 16);
            cache.write(TileHash(1), b"aaa");
            cache.write(TileHash(2), b"bbbb");
        }

        let reopened = open(&dir, 1024, 16);

        assert_eq!(reopened.entry_count(), 2);
        assert_eq!(reopened.size_bytes(), 7);
        assert_eq!(&reopened.read(TileHash(2)).unwrap()[..], b"bbbb");
    }

    #[test]
    fn test_cold_open_ignores_existing_tiles() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("00000001.tile"), b"old").unwrap();

        let cache = TileCache::open(
            TileCacheConfig::new(dir.path()).with_rebuild_index(false),
        )
        .unwrap();

        assert_eq!(cache.entry_count(), 0);
        assert!(cache.read(TileHash(1)).is_none());
    }

    #[test]
    fn test_rebuild_evicts_when_over_capacity() {
        let dir = TempDir::new().unwrap();
        for n in 1..=3u32 {
            fs::write(dir.path().join(format!("{:08x}.tile", n)), [0u8; 10]).unwrap();
        }

        let cache = open(&dir, 1024, 2);

        assert_eq!(cache.entry_count(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_rebuild_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.md"), b"hi").unwrap();
        fs::write(dir.path().join("00000001.tile"), b"x").unwrap();
        let cache = TileCache::open(
            TileCacheConfig::new(dir.path()).with_rebuild_index(false),
        )
        .unwrap();

        let stats = cache.populate_from_disk().unwrap();

        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.skipped, 1);
    }
}
