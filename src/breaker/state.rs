//! Breaker state, configuration and reporting types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Circuit State ==
/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without reaching the downstream
    Open,
    /// A single trial call is allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

// == Configuration ==
/// Thresholds and timers for one breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure rate (percent) that must be exceeded to open
    pub error_threshold_percentage: f64,
    /// Number of most recent counted calls the failure rate is computed over.
    /// The rate is always taken against the full window size.
    pub evaluation_window: usize,
    /// Outcomes required in the window before the rate is evaluated
    pub minimum_calls: usize,
    /// Time spent OPEN before a trial call is allowed
    pub reset_timeout: Duration,
    /// Factor applied to the reset timeout after each consecutive failed
    /// probe; 1.0 disables backoff
    pub backoff_multiplier: f64,
    /// Upper bound for the backed-off reset timeout
    pub max_reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50.0,
            evaluation_window: 10,
            minimum_calls: 1,
            reset_timeout: Duration::from_secs(30),
            backoff_multiplier: 1.0,
            max_reset_timeout: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    /// Reset timeout after `consecutive_trips` openings without a recovery.
    pub fn reset_timeout_for(&self, consecutive_trips: u32) -> Duration {
        let base = self.reset_timeout;
        let cap = self.max_reset_timeout.max(base);
        let exponent = consecutive_trips.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);

        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(cap)
            .min(cap)
    }
}

// == Snapshot ==
/// Point-in-time view of a breaker for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    /// Downstream service the breaker guards
    pub service: String,
    /// Current state
    pub state: CircuitState,
    /// Failures in the evaluation window
    pub failure_count: u32,
    /// Successes in the evaluation window
    pub success_count: u32,
    /// Failure percentage over the evaluation window
    pub failure_rate: f64,
    /// Last counted failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// When the next trial call is allowed
    pub next_probe_at: Option<DateTime<Utc>>,
    /// Held open by an operator
    pub forced: bool,
}

/// Converts Unix milliseconds into a UTC timestamp.
pub(crate) fn to_datetime(ms: u64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).ok()?)
}
