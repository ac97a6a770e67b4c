//! Cache Metrics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! memory usage.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Metrics ==
/// Aggregate cache counters.
///
/// Counters are maintained by every mutating store operation and reset to
/// their defaults by `CacheStore::clear`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Number of successful cache retrievals
    pub hit_count: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub miss_count: u64,
    /// Number of entries removed by the eviction policy
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Sum of entry size estimates in bytes
    pub memory_usage: usize,
    /// Mean lifetime in seconds of entries that expire
    pub average_ttl: f64,
    /// When the last expiry sweep ran
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

impl CacheMetrics {
    // == Constructor ==
    /// Creates a new CacheMetrics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Rates ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    /// Returns misses / (hits + misses), or 0.0 if no reads have been made.
    pub fn miss_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.miss_count as f64 / total as f64
        }
    }

    // == Recorders ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hit_count += 1;
    }

    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.miss_count += 1;
    }

    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Stamps the time of an expiry sweep.
    pub fn record_cleanup(&mut self) {
        self.last_cleanup_at = Some(Utc::now());
    }

    /// Accounts for an inserted entry.
    pub(crate) fn add_entry(&mut self, size: usize) {
        self.total_entries += 1;
        self.memory_usage += size;
    }

    /// Accounts for a removed entry.
    pub(crate) fn remove_entry(&mut self, size: usize) {
        self.total_entries = self.total_entries.saturating_sub(1);
        self.memory_usage = self.memory_usage.saturating_sub(size);
    }
}
