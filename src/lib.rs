//! Integration Gateway - resilience layer for outbound integrations
//!
//! Wraps calls to external services (court systems, payment processors,
//! research APIs) with a fixed-window rate limiter, a TTL response cache and
//! per-service circuit breakers, and audits every call.

pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{CacheError, GatewayError};
pub use gateway::{DownstreamError, DownstreamInvoker, Gateway, InvokeOptions};
pub use tasks::spawn_cleanup_task;
