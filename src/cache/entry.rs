//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// TTL marker for entries that never expire.
pub const NO_EXPIRY: i64 = -1;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The entry key
    pub key: String,
    /// The stored payload
    pub value: Value,
    /// Total lifetime in seconds measured from `created_at`, or `NO_EXPIRY`
    pub ttl_seconds: i64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Number of successful reads
    pub hit_count: u64,
    /// Approximate footprint in bytes (key + serialized value)
    pub size_estimate: usize,
    /// Store-wide sequence number of the last access, orders LRU eviction
    pub(crate) access_seq: u64,
    /// Store-wide sequence number of the insertion, orders FIFO eviction
    pub(crate) insert_seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `key` - The entry key
    /// * `value` - The value to store
    /// * `ttl_seconds` - Lifetime in seconds, or `NO_EXPIRY`
    /// * `seq` - Store sequence number used for eviction ordering
    pub fn new(key: String, value: Value, ttl_seconds: i64, seq: u64) -> Self {
        let now = current_timestamp_ms();
        let expires_at = if ttl_seconds == NO_EXPIRY {
            None
        } else {
            Some(expiry_after(now, ttl_seconds.max(0) as u64))
        };
        let size_estimate = estimate_size(&key, &value);

        Self {
            key,
            value,
            ttl_seconds,
            created_at: now,
            last_accessed_at: now,
            expires_at,
            hit_count: 0,
            size_estimate,
            access_seq: seq,
            insert_seq: seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time. Both lazy expiry on access and the background
    /// sweep go through this predicate.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as `is_expired`, against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let now = current_timestamp_ms();
            expires.saturating_sub(now)
        })
    }

    /// Returns remaining TTL in whole seconds, rounded up, or None if no
    /// expiration is set.
    ///
    /// Rounding up keeps a live entry from ever reporting 0.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms.div_ceil(1000))
    }

    /// Fraction of the entry's lifetime already consumed (`age / ttl`).
    ///
    /// Entries without expiration have no ratio.
    pub fn expiry_ratio(&self, now: u64) -> Option<f64> {
        let expires = self.expires_at?;
        let lifetime = expires.saturating_sub(self.created_at);
        let age = now.saturating_sub(self.created_at);
        if lifetime == 0 {
            return Some(f64::INFINITY);
        }
        Some(age as f64 / lifetime as f64)
    }

    // == Mutators ==
    /// Records a successful read.
    pub(crate) fn touch(&mut self, now: u64, seq: u64) {
        self.last_accessed_at = now;
        self.hit_count += 1;
        self.access_seq = seq;
    }

    /// Moves the expiration to `now + ttl_seconds` while keeping the original
    /// creation time, so `ttl_seconds` keeps describing the whole lifetime.
    pub(crate) fn rebase_ttl(&mut self, now: u64, ttl_seconds: u64) {
        let expires = expiry_after(now, ttl_seconds);
        self.expires_at = Some(expires);
        self.ttl_seconds = expires.saturating_sub(self.created_at).div_ceil(1000) as i64;
    }

    /// Removes the expiration.
    pub(crate) fn persist(&mut self) {
        self.expires_at = None;
        self.ttl_seconds = NO_EXPIRY;
    }

    /// Replaces the value in place, keeping TTL and access metadata.
    pub(crate) fn replace_value(&mut self, value: Value) {
        self.size_estimate = estimate_size(&self.key, &value);
        self.value = value;
    }
}

// == Snapshot Entry ==
/// Serializable form of a live entry used by export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshotEntry {
    /// The entry key
    pub key: String,
    /// The stored payload
    pub value: Value,
    /// Remaining TTL in seconds at export time, or -1
    pub ttl_seconds: i64,
    /// Reads recorded before export
    #[serde(default)]
    pub hit_count: u64,
}

// == Utility Functions ==
/// Expiration timestamp `ttl_seconds` after `now`, saturating at `u64::MAX`.
fn expiry_after(now: u64, ttl_seconds: u64) -> u64 {
    now.saturating_add(ttl_seconds.saturating_mul(1000))
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Approximates the memory held by an entry.
///
/// Serialization failures count as zero bytes rather than failing the write.
pub fn estimate_size(key: &str, value: &Value) -> usize {
    key.len() + serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
