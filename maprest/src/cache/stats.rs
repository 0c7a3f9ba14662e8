//! Tile cache statistics.

use std::time::{Duration, Instant};

/// Counters kept by the tile cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub evictions: u64,
    pub removals: u64,

    // Current footprint
    pub size_bytes: u64,
    pub entry_count: usize,

    pub created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            writes: 0,
            write_failures: 0,
            evictions: 0,
            removals: 0,
            size_bytes: 0,
            entry_count: 0,
            created_at: Instant::now(),
        }
    }

    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    pub fn update_size(&mut self, size_bytes: u64, entry_count: usize) {
        self.size_bytes = size_bytes;
        self.entry_count = entry_count;
    }

    /// Human-readable report.
    pub fn format(&self, directory: &str) -> String {
        format!(
            r#"Tile Cache Statistics
Directory: {}

  Entries:     {}
  Size:        {:.2} MB
  Hits:        {}
  Misses:      {}
  Hit Rate:    {:.1}%
  Writes:      {}
  Failures:    {}
  Evictions:   {}
  Removals:    {}
  Uptime:      {}s
"#,
            directory,
            self.entry_count,
            self.size_bytes as f64 / (1024.0 * 1024.0),
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.writes,
            self.write_failures,
            self.evictions,
            self.removals,
            self.uptime().as_secs(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.hits = 75;
        stats.misses = 25;

        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_operations() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_write();
        stats.record_write_failure();
        stats.record_evictions(3);
        stats.record_removal();

        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.removals, 1);
    }

    #[test]
    fn test_format_report() {
        let mut stats = CacheStats::new();
        stats.update_size(2 * 1024 * 1024, 12);

        let report = stats.format("/tmp/tiles");

        assert!(report.contains("Directory: /tmp/tiles"));
        assert!(report.contains("Entries:     12"));
        assert!(report.contains("Size:        2.00 MB"));
    }
}
