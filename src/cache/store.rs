//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with a pluggable eviction
//! policy and TTL expiration.
//!
//! Expired entries are removed lazily when touched by a read and eagerly by
//! `cleanup_expired`, which the background task calls on an interval. Both
//! paths use `CacheEntry::is_expired_at`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::cache::{
    current_timestamp_ms, estimate_size, eviction_batch_size, glob_to_regex, CacheEntry,
    CacheMetrics, CacheSnapshotEntry, EvictionPolicy, MAX_KEY_LENGTH, MAX_VALUE_SIZE, NO_EXPIRY,
};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Main cache storage with policy-driven eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Victim selection strategy
    policy: EvictionPolicy,
    /// Performance counters
    metrics: CacheMetrics,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL
    default_ttl: i64,
    /// Monotonic counter ordering inserts and accesses
    seq: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new LRU CacheStore with specified capacity and default TTL.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    /// * `default_ttl` - Default TTL in seconds for entries without explicit TTL
    pub fn new(max_entries: usize, default_ttl: u64) -> Self {
        Self::with_policy(max_entries, default_ttl, EvictionPolicy::Lru)
    }

    /// Creates a new CacheStore with an explicit eviction policy.
    pub fn with_policy(max_entries: usize, default_ttl: u64, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
            metrics: CacheMetrics::new(),
            max_entries,
            default_ttl: default_ttl.min(i64::MAX as u64) as i64,
            seq: 0,
        }
    }

    /// Returns the configured eviction policy.
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Returns the configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// If the key already exists, the entry is replaced and its TTL reset.
    /// Inserting a new key into a full cache first evicts one batch of
    /// entries chosen by the eviction policy.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - TTL in seconds, `-1` for no expiry, `None` for the default
    pub fn set(&mut self, key: String, value: Value, ttl: Option<i64>) -> Result<()> {
        validate_key(&key)?;
        let ttl = self.resolve_ttl(ttl)?;

        let seq = self.next_seq();
        let entry = CacheEntry::new(key, value, ttl, seq);
        validate_size(entry.size_estimate)?;

        self.insert_entry(entry)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired. Expired entries are
    /// removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = current_timestamp_ms();
        if self.remove_if_expired(key, now) {
            self.metrics.record_miss();
            return None;
        }

        let seq = self.next_seq();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now, seq);
                self.metrics.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether the key was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    // == Exists ==
    /// Returns true if the key holds a live entry. Does not count as a read.
    pub fn exists(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key, current_timestamp_ms()) {
            return false;
        }
        self.entries.contains_key(key)
    }

    // == TTL ==
    /// Returns the remaining TTL in seconds, `-1` for entries that never
    /// expire, or None when the key is absent.
    pub fn ttl(&mut self, key: &str) -> Option<i64> {
        if self.remove_if_expired(key, current_timestamp_ms()) {
            return None;
        }
        self.entries
            .get(key)
            .map(|entry| match entry.ttl_remaining() {
                Some(secs) => secs as i64,
                None => NO_EXPIRY,
            })
    }

    // == Expire ==
    /// Moves a key's expiry to `now + ttl_seconds`.
    ///
    /// Returns false when the key is absent.
    pub fn expire(&mut self, key: &str, ttl_seconds: i64) -> Result<bool> {
        if ttl_seconds <= 0 {
            return Err(CacheError::InvalidRequest(format!(
                "TTL must be positive, got {}",
                ttl_seconds
            )));
        }
        let now = current_timestamp_ms();
        if self.remove_if_expired(key, now) {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.rebase_ttl(now, ttl_seconds as u64);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Persist ==
    /// Removes a key's expiry. Returns false when the key is absent.
    pub fn persist(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key, current_timestamp_ms()) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.persist();
                true
            }
            None => false,
        }
    }

    // == Scan ==
    /// Returns up to `limit` live keys matching a glob pattern, sorted.
    ///
    /// Walks every key, so cost grows linearly with the cache size.
    pub fn scan(&self, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let now = current_timestamp_ms();

        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| !entry.is_expired_at(now) && matcher.is_match(&entry.key))
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }

    // == Increment / Decrement ==
    /// Adds `delta` to a numeric value and returns the result.
    ///
    /// Missing keys and non-numeric values start from 0. An existing entry
    /// keeps its TTL; a new one gets the default TTL.
    pub fn increment(&mut self, key: &str, delta: i64) -> Result<i64> {
        validate_key(key)?;
        let now = current_timestamp_ms();
        self.remove_if_expired(key, now);

        let current = self
            .entries
            .get(key)
            .map(|entry| numeric_value(&entry.value))
            .unwrap_or(0);
        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::InvalidRequest(format!("Increment of '{}' would overflow", key))
        })?;

        match self.entries.get_mut(key) {
            Some(entry) => {
                let old_size = entry.size_estimate;
                entry.replace_value(Value::from(next));
                let new_size = entry.size_estimate;
                self.metrics.remove_entry(old_size);
                self.metrics.add_entry(new_size);
            }
            None => {
                let seq = self.next_seq();
                let entry = CacheEntry::new(key.to_string(), Value::from(next), self.default_ttl, seq);
                self.insert_entry(entry)?;
            }
        }
        Ok(next)
    }

    /// Subtracts `delta` from a numeric value and returns the result.
    pub fn decrement(&mut self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta.checked_neg().ok_or_else(|| {
            CacheError::InvalidRequest(format!("Decrement of '{}' would overflow", key))
        })?;
        self.increment(key, negated)
    }

    // == Bulk Operations ==
    /// Reads several keys at once; results are aligned with `keys`.
    pub fn get_multiple<S: AsRef<str>>(&mut self, keys: &[S]) -> Vec<Option<Value>> {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }

    /// Writes several entries with a shared TTL.
    ///
    /// Every key is validated before anything is written.
    pub fn set_multiple<I>(&mut self, entries: I, ttl: Option<i64>) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let entries: Vec<(String, Value)> = entries.into_iter().collect();
        for (key, _) in &entries {
            validate_key(key)?;
        }
        self.resolve_ttl(ttl)?;

        for (key, value) in entries {
            self.set(key, value, ttl)?;
        }
        Ok(())
    }

    // == Metrics ==
    /// Returns current cache metrics with derived fields filled in.
    pub fn metrics(&self) -> CacheMetrics {
        let mut metrics = self.metrics.clone();
        let expiring: Vec<f64> = self
            .entries
            .values()
            .filter(|entry| entry.ttl_seconds != NO_EXPIRY)
            .map(|entry| entry.ttl_seconds as f64)
            .collect();
        metrics.average_ttl = if expiring.is_empty() {
            0.0
        } else {
            expiring.iter().sum::<f64>() / expiring.len() as f64
        };
        metrics.total_entries = self.entries.len();
        metrics
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_entry(&key);
        }

        self.metrics.record_cleanup();
        count
    }

    // == Clear ==
    /// Removes every entry and resets metrics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.metrics = CacheMetrics::new();
    }

    // == Export / Import ==
    /// Returns all live entries with their remaining TTL, sorted by key.
    pub fn export_data(&self) -> Vec<CacheSnapshotEntry> {
        let now = current_timestamp_ms();
        let mut snapshot: Vec<CacheSnapshotEntry> = self
            .entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| CacheSnapshotEntry {
                key: entry.key.clone(),
                value: entry.value.clone(),
                ttl_seconds: match entry.expires_at {
                    Some(expires) => expires.saturating_sub(now).div_ceil(1000) as i64,
                    None => NO_EXPIRY,
                },
                hit_count: entry.hit_count,
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    /// Loads exported entries, returning how many were stored.
    ///
    /// Entries whose TTL already ran out (`ttl_seconds` of 0 or below other
    /// than -1) are skipped. Every remaining entry is validated before the
    /// first write, so a rejected snapshot leaves the cache untouched.
    pub fn import_data<I>(&mut self, snapshot: I) -> Result<usize>
    where
        I: IntoIterator<Item = CacheSnapshotEntry>,
    {
        let pending: Vec<CacheSnapshotEntry> = snapshot
            .into_iter()
            .filter(|item| {
                let expired = item.ttl_seconds != NO_EXPIRY && item.ttl_seconds <= 0;
                if expired {
                    debug!("Skipping expired snapshot entry {}", item.key);
                }
                !expired
            })
            .collect();

        for item in &pending {
            validate_key(&item.key)?;
            validate_size(estimate_size(&item.key, &item.value))?;
        }
        if !pending.is_empty() && self.max_entries == 0 {
            return Err(CacheError::CacheFull(
                "Cache has no capacity for imported entries".to_string(),
            ));
        }

        let imported = pending.len();
        for item in pending {
            let key = item.key;
            self.set(key.clone(), item.value, Some(item.ttl_seconds))?;
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.hit_count = item.hit_count;
            }
        }
        Ok(imported)
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Internals ==
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn resolve_ttl(&self, ttl: Option<i64>) -> Result<i64> {
        match ttl {
            None => Ok(self.default_ttl),
            Some(NO_EXPIRY) => Ok(NO_EXPIRY),
            Some(secs) if secs > 0 => Ok(secs),
            Some(secs) => Err(CacheError::InvalidRequest(format!(
                "TTL must be positive or -1, got {}",
                secs
            ))),
        }
    }

    fn insert_entry(&mut self, entry: CacheEntry) -> Result<()> {
        if self.remove_entry(&entry.key).is_none() && self.entries.len() >= self.max_entries {
            self.evict_batch()?;
        }
        self.metrics.add_entry(entry.size_estimate);
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Evicts one batch sized from the configured capacity.
    fn evict_batch(&mut self) -> Result<()> {
        let batch = eviction_batch_size(self.max_entries);
        let victims = self
            .policy
            .select_victims(self.entries.values(), batch, current_timestamp_ms());
        if victims.is_empty() {
            return Err(CacheError::CacheFull(
                "Cache is full and eviction failed".to_string(),
            ));
        }

        for key in &victims {
            self.remove_entry(key);
            self.metrics.record_eviction();
        }
        debug!(
            "Evicted {} entries using {} policy",
            victims.len(),
            self.policy
        );
        Ok(())
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.metrics.remove_entry(removed.size_estimate);
        Some(removed)
    }

    fn remove_if_expired(&mut self, key: &str, now: u64) -> bool {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(now));
        if expired {
            self.remove_entry(key);
        }
        expired
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn validate_size(size_estimate: usize) -> Result<()> {
    if size_estimate > MAX_VALUE_SIZE {
        return Err(CacheError::InvalidRequest(format!(
            "Value exceeds maximum size of {} bytes",
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

/// Reads a counter out of a stored value; anything non-numeric counts as 0.
fn numeric_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
