//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::{CacheSnapshotEntry, MAX_KEY_LENGTH};

/// Request body for cache import (POST /cache/import)
///
/// Accepts the body returned by `GET /cache/export`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    /// Entries to load
    pub entries: Vec<CacheSnapshotEntry>,
}

impl ImportRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        for entry in &self.entries {
            if entry.key.is_empty() {
                return Some("Key cannot be empty".to_string());
            }
            if entry.key.len() > MAX_KEY_LENGTH {
                return Some(format!(
                    "Key exceeds maximum length of {} characters",
                    MAX_KEY_LENGTH
                ));
            }
        }
        None
    }
}
