//! Configuration Module
//!
//! Handles loading gateway configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::breaker::CircuitBreakerConfig;
use crate::cache::EvictionPolicy;
use crate::limiter::RateLimitRule;

/// Gateway configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Cache victim selection strategy
    pub eviction_policy: EvictionPolicy,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Default requests per window for each identity and service
    pub rate_limit_max_requests: u32,
    /// Default rate-limit window in seconds
    pub rate_limit_window: u64,
    /// Per-service overrides of the default rate limit
    pub service_rate_limits: HashMap<String, RateLimitRule>,
    /// Failure percentage that must be exceeded to open a breaker
    pub breaker_error_threshold: f64,
    /// Number of recent calls a breaker evaluates
    pub breaker_window: usize,
    /// Calls required in the window before a breaker may open
    pub breaker_min_calls: usize,
    /// Seconds a breaker stays open before admitting a trial
    pub breaker_reset_timeout: u64,
    /// Per-call downstream timeout in milliseconds
    pub call_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `EVICTION_POLICY` - `lru`, `fifo` or `ttl` (default: lru)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `RATE_LIMIT_MAX_REQUESTS` - Requests per window (default: 100)
    /// - `RATE_LIMIT_WINDOW` - Window length in seconds (default: 60)
    /// - `SERVICE_RATE_LIMITS` - Overrides, e.g. `court=10/60,payments=5/1`
    /// - `BREAKER_ERROR_THRESHOLD` - Failure percentage (default: 50)
    /// - `BREAKER_WINDOW` - Calls evaluated (default: 10)
    /// - `BREAKER_MIN_CALLS` - Calls before evaluating (default: 1)
    /// - `BREAKER_RESET_TIMEOUT` - Open duration in seconds (default: 30)
    /// - `CALL_TIMEOUT_MS` - Downstream timeout (default: 30000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            eviction_policy: env_or("EVICTION_POLICY", defaults.eviction_policy),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            rate_limit_max_requests: env_or(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            rate_limit_window: env_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window),
            service_rate_limits: env::var("SERVICE_RATE_LIMITS")
                .ok()
                .map(|v| parse_service_limits(&v))
                .unwrap_or_default(),
            breaker_error_threshold: env_or(
                "BREAKER_ERROR_THRESHOLD",
                defaults.breaker_error_threshold,
            ),
            breaker_window: env_or("BREAKER_WINDOW", defaults.breaker_window),
            breaker_min_calls: env_or("BREAKER_MIN_CALLS", defaults.breaker_min_calls),
            breaker_reset_timeout: env_or(
                "BREAKER_RESET_TIMEOUT",
                defaults.breaker_reset_timeout,
            ),
            call_timeout_ms: env_or("CALL_TIMEOUT_MS", defaults.call_timeout_ms),
        }
    }

    /// Breaker settings derived from this configuration.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            error_threshold_percentage: self.breaker_error_threshold,
            evaluation_window: self.breaker_window.max(1),
            minimum_calls: self.breaker_min_calls,
            reset_timeout: Duration::from_secs(self.breaker_reset_timeout),
            ..CircuitBreakerConfig::default()
        }
    }

    /// Rate limit applied to services without an override.
    pub fn default_rate_limit(&self) -> RateLimitRule {
        RateLimitRule::per_seconds(self.rate_limit_max_requests, self.rate_limit_window.max(1))
    }

    /// Downstream call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            eviction_policy: EvictionPolicy::Lru,
            cleanup_interval: 300,
            server_port: 3000,
            rate_limit_max_requests: 100,
            rate_limit_window: 60,
            service_rate_limits: HashMap::new(),
            breaker_error_threshold: 50.0,
            breaker_window: 10,
            breaker_min_calls: 1,
            breaker_reset_timeout: 30,
            call_timeout_ms: 30_000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses `service=max/window_secs` pairs separated by commas.
///
/// Malformed pairs are skipped with a warning.
pub fn parse_service_limits(raw: &str) -> HashMap<String, RateLimitRule> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parsed = pair
                .split_once('=')
                .ok_or_else(|| format!("expected <service>=<max>/<window_secs>, got '{}'", pair))
                .and_then(|(service, rule)| {
                    let service = service.trim();
                    if service.is_empty() {
                        return Err(format!("missing service name in '{}'", pair));
                    }
                    Ok((service.to_string(), rule.parse::<RateLimitRule>()?))
                });
            match parsed {
                Ok(limit) => Some(limit),
                Err(e) => {
                    warn!("Ignoring rate limit override: {}", e);
                    None
                }
            }
        })
        .collect()
}
