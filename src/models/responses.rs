//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::breaker::to_datetime;
use crate::cache::{CacheMetrics, CacheSnapshotEntry};
use crate::limiter::RateWindow;

/// Response body for the stats endpoint (GET /cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Estimated bytes held
    pub memory_usage: usize,
    /// Mean TTL in seconds of expiring entries
    pub average_ttl: f64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// When the expiry sweep last ran
    pub last_cleanup_at: Option<DateTime<Utc>>,
}

impl From<CacheMetrics> for StatsResponse {
    fn from(metrics: CacheMetrics) -> Self {
        Self {
            hits: metrics.hit_count,
            misses: metrics.miss_count,
            evictions: metrics.evictions,
            total_entries: metrics.total_entries,
            memory_usage: metrics.memory_usage,
            average_ttl: metrics.average_ttl,
            hit_rate: metrics.hit_rate(),
            last_cleanup_at: metrics.last_cleanup_at,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status: "healthy", or "degraded" while any breaker is not closed
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Registered downstream services
    pub services: Vec<String>,
    /// Services whose breaker is not closed
    pub open_circuits: Vec<String>,
}

impl HealthResponse {
    /// Creates a HealthResponse with the current timestamp.
    pub fn new(services: Vec<String>, open_circuits: Vec<String>) -> Self {
        let status = if open_circuits.is_empty() {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            services,
            open_circuits,
        }
    }
}

/// Response body for cache export (GET /cache/export)
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    /// Number of exported entries
    pub count: usize,
    /// Live entries with their remaining TTL
    pub entries: Vec<CacheSnapshotEntry>,
}

impl ExportResponse {
    pub fn new(entries: Vec<CacheSnapshotEntry>) -> Self {
        Self {
            count: entries.len(),
            entries,
        }
    }
}

/// Response body for cache import (POST /cache/import)
#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    /// Entries stored; expired snapshot entries are skipped
    pub imported: usize,
}

/// Response body for the reset and clear endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    /// Success message
    pub message: String,
    /// Number of items removed
    pub cleared: usize,
}

impl ResetResponse {
    pub fn new(message: impl Into<String>, cleared: usize) -> Self {
        Self {
            message: message.into(),
            cleared,
        }
    }
}

/// Live rate-limit window of one identity on one service
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitWindowStatus {
    pub service: String,
    /// Requests counted in the window, rejected ones included
    pub count: u32,
    /// When the window resets
    pub window_reset_at: Option<DateTime<Utc>>,
}

impl RateLimitWindowStatus {
    pub fn new(service: impl Into<String>, window: &RateWindow) -> Self {
        Self {
            service: service.into(),
            count: window.count,
            window_reset_at: to_datetime(window.window_reset_at),
        }
    }
}

/// Response body for GET /rate-limits/:identity
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatusResponse {
    pub identity: String,
    /// One entry per service with a live window
    pub windows: Vec<RateLimitWindowStatus>,
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
