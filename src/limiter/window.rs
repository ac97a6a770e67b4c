//! Rate Window Module
//!
//! Per-identity counter state and the decision returned to callers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

// == Rate Limit Rule ==
/// Quota of `max_requests` per fixed `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl RateLimitRule {
    /// Creates a rule from a request count and a window in seconds.
    pub fn per_seconds(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.max_requests, self.window.as_secs())
    }
}

/// Parses `max/window_secs`, e.g. `100/60`.
impl FromStr for RateLimitRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (max, window) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("expected <max>/<window_secs>, got '{}'", s))?;
        let max_requests = max
            .trim()
            .parse()
            .map_err(|_| format!("invalid request count in '{}'", s))?;
        let window_secs: u64 = window
            .trim()
            .parse()
            .map_err(|_| format!("invalid window in '{}'", s))?;
        if window_secs == 0 {
            return Err(format!("window must be positive in '{}'", s));
        }
        Ok(Self::per_seconds(max_requests, window_secs))
    }
}

// == Rate Window ==
/// Fixed-window counter for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateWindow {
    /// Requests seen in the current window, rejected ones included
    pub count: u32,
    /// Unix milliseconds at which the window resets
    pub window_reset_at: u64,
}

impl RateWindow {
    /// Opens an empty window starting at `now`.
    pub fn open(now: u64, window: Duration) -> Self {
        Self {
            count: 0,
            window_reset_at: now + window.as_millis() as u64,
        }
    }

    /// Whether the window has run out at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.window_reset_at
    }
}

// == Rate Decision ==
/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Configured quota
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Unix milliseconds at which the window resets
    pub reset_at: u64,
    /// Time until the window resets, set only on rejection
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl RateDecision {
    /// Retry delay in whole seconds, rounded up and at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|wait| (wait.as_millis() as u64).div_ceil(1000).max(1))
    }
}
