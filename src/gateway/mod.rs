//! Gateway Module
//!
//! The single entry point other subsystems use to reach external services.
//! Combines the rate limiter, response cache and per-service circuit breakers
//! around a pluggable downstream invoker, and audits every call.

mod audit;
mod invoker;
mod pipeline;

pub use audit::{AuditEvent, AuditOutcome, AuditSink, ChannelAuditSink, TracingAuditSink};
pub use invoker::{DownstreamError, DownstreamErrorKind, DownstreamInvoker};
pub use pipeline::{cache_key, Gateway, GatewaySettings, InvokeOptions};
