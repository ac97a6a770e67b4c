//! Eviction Policy Module
//!
//! Chooses which entries to drop when the cache reaches capacity.
//!
//! # Policies
//! - LRU: oldest last access first
//! - FIFO: oldest insertion first
//! - TTL proximity: highest `age / ttl` first, entries without TTL skipped

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

/// Share of the configured capacity removed by one eviction pass.
pub const EVICTION_FRACTION_PERCENT: usize = 10;

// == Eviction Policy ==
/// Strategy used to pick eviction victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// First in, first out
    Fifo,
    /// Closest to expiring
    TtlProximity,
}

impl EvictionPolicy {
    // == Select Victims ==
    /// Returns up to `count` keys to evict, in eviction order.
    ///
    /// TTL proximity falls back to LRU order over persistent entries when
    /// there are not enough expiring entries to satisfy `count`, so the
    /// capacity bound still holds.
    pub fn select_victims<'a, I>(&self, entries: I, count: usize, now: u64) -> Vec<String>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        if count == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<&CacheEntry> = entries.into_iter().collect();

        match self {
            EvictionPolicy::Lru => {
                candidates.sort_by_key(|entry| entry.access_seq);
            }
            EvictionPolicy::Fifo => {
                candidates.sort_by_key(|entry| entry.insert_seq);
            }
            EvictionPolicy::TtlProximity => {
                // Expiring entries by descending ratio, then persistent ones by LRU
                candidates.sort_by(|a, b| match (a.expiry_ratio(now), b.expiry_ratio(now)) {
                    (Some(ra), Some(rb)) => rb
                        .total_cmp(&ra)
                        .then_with(|| a.access_seq.cmp(&b.access_seq)),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => a.access_seq.cmp(&b.access_seq),
                });
            }
        }

        candidates
            .into_iter()
            .take(count)
            .map(|entry| entry.key.clone())
            .collect()
    }
}

// == Batch Size ==
/// Number of entries one eviction pass removes: 10% of the configured
/// capacity, rounded up, never less than one.
pub fn eviction_batch_size(max_entries: usize) -> usize {
    max_entries.saturating_mul(EVICTION_FRACTION_PERCENT).div_ceil(100).max(1)
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "lru"),
            EvictionPolicy::Fifo => write!(f, "fifo"),
            EvictionPolicy::TtlProximity => write!(f, "ttl_proximity"),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" | "ttl_proximity" | "ttl-proximity" => Ok(EvictionPolicy::TtlProximity),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}
