//! In-memory index of cached tiles.
//!
//! The index tracks size, hit count and recency of every tile and picks
//! eviction victims. It is not synchronised itself; [`TileCache`] keeps it
//! behind its own mutex.
//!
//! # Recency
//!
//! Recency is a monotonic access tick instead of a wall-clock timestamp.
//! Every insert and every touch takes the next tick, so two accesses never
//! tie and eviction order does not depend on timer resolution.
//!
//! [`TileCache`]: super::TileCache

use super::types::{TileCacheEntry, TileHash};
use std::collections::HashMap;

/// Index of cached tiles keyed by hash.
#[derive(Debug, Default)]
pub struct TileIndex {
    entries: HashMap<TileHash, TileCacheEntry>,
    total_bytes: u64,
    next_tick: u64,
}

impl TileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Records a freshly written tile.
    ///
    /// Replacing an existing hash keeps its hit count and adjusts the total
    /// size by the difference.
    pub fn insert(&mut self, hash: TileHash, size_bytes: u64) -> TileCacheEntry {
        let tick = self.tick();
        let entry = match self.entries.get(&hash) {
            Some(old) => {
                self.total_bytes = self.total_bytes - old.size_bytes + size_bytes;
                TileCacheEntry {
                    size_bytes,
                    last_access: tick,
                    ..*old
                }
            }
            None => {
                self.total_bytes += size_bytes;
                TileCacheEntry {
                    hash,
                    size_bytes,
                    hit_count: 0,
                    last_access: tick,
                }
            }
        };
        self.entries.insert(hash, entry);
        entry
    }

    /// Registers a hit: increments the hit count and refreshes recency.
    pub fn touch(&mut self, hash: TileHash) -> Option<TileCacheEntry> {
        let tick = self.tick();
        let entry = self.entries.get_mut(&hash)?;
        entry.hit_count += 1;
        entry.last_access = tick;
        Some(*entry)
    }

    pub fn remove(&mut self, hash: TileHash) -> Option<TileCacheEntry> {
        let entry = self.entries.remove(&hash)?;
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    pub fn get(&self, hash: TileHash) -> Option<TileCacheEntry> {
        self.entries.get(&hash).copied()
    }

    pub fn contains(&self, hash: TileHash) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Drops every entry. The access tick keeps counting.
    pub fn clear(&mut self) -> Vec<TileCacheEntry> {
        self.total_bytes = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// All entries in eviction order: least recently used first, ties broken
    /// by the lower hit count.
    pub fn eviction_order(&self) -> Vec<TileCacheEntry> {
        let mut entries: Vec<TileCacheEntry> = self.entries.values().copied().collect();
        entries.sort_by_key(|e| (e.last_access, e.hit_count, e.hash));
        entries
    }

    /// Removes entries in eviction order until both limits hold.
    ///
    /// Returns the removed entries, first victim first. The caller deletes
    /// their files.
    pub fn evict_to_fit(&mut self, capacity_bytes: u64, capacity_count: usize) -> Vec<TileCacheEntry> {
        if self.within(capacity_bytes, capacity_count) {
            return Vec::new();
        }

        let mut victims = Vec::new();
        for candidate in self.eviction_order() {
            if self.within(capacity_bytes, capacity_count) {
                break;
            }
            if let Some(entry) = self.remove(candidate.hash) {
                victims.push(entry);
            }
        }
        victims
    }

    fn within(&self, capacity_bytes: u64, capacity_count: usize) -> bool {
        self.total_bytes <= capacity_bytes && self.entries.len() <= capacity_count
    }
}
