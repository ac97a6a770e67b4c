//! Rate Limiter Module
//!
//! Fixed-window request quotas keyed by a caller-supplied identity.

mod fixed_window;
mod window;

pub use fixed_window::RateLimiter;
pub use window::{RateDecision, RateLimitRule, RateWindow};
