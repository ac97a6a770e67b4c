//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and pluggable eviction
//! (LRU, FIFO, TTL proximity).

mod entry;
mod eviction;
mod metrics;
mod pattern;
mod store;


use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::{current_timestamp_ms, estimate_size, CacheEntry, CacheSnapshotEntry, NO_EXPIRY};
pub use eviction::{eviction_batch_size, EvictionPolicy};
pub use metrics::CacheMetrics;
pub use pattern::glob_to_regex;
pub use store::CacheStore;

/// Process-wide cache handle shared by the gateway, admin API and cleanup task.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed entry size estimate in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
