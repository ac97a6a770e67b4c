//! Circuit Breaker Module
//!
//! Per-service failure isolation: a breaker stops calls to a downstream that
//! keeps failing and lets a single trial through once the reset timeout
//! passes.

mod circuit;
mod registry;
mod state;

pub use circuit::{BreakerPermit, CircuitBreaker, CircuitOpenError, ExecuteError, TripsBreaker};
pub use registry::BreakerRegistry;
pub use state::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
pub(crate) use state::to_datetime;
