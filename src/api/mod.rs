//! API Module
//!
//! HTTP handlers and routing for the operator admin surface. Application
//! traffic never goes through here; it calls `Gateway::invoke` directly.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `/breakers` - Inspect and override circuit breakers
//! - `/rate-limits` - Inspect and reset rate-limit windows
//! - `/cache` - Cache stats, export, import and clear

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
