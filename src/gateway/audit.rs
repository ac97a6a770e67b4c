//! Audit Events
//!
//! Every gateway call produces exactly one audit event, whatever its outcome.
//! Sinks must not block; the gateway calls them inline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How a gateway call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Downstream call succeeded
    Success,
    /// Served from cache without calling the downstream
    CacheHit,
    /// Rejected by the rate limiter
    RateLimited,
    /// Rejected by the circuit breaker
    CircuitOpen,
    /// Downstream call failed
    Failed,
    /// Downstream call exceeded its timeout
    TimedOut,
    /// No invoker registered for the service
    UnknownService,
}

/// One record per gateway call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub service_id: String,
    pub operation: String,
    pub identity: String,
    pub outcome: AuditOutcome,
    /// Time spent inside the gateway, downstream call included
    pub latency_ms: u64,
    /// Error display text; never the downstream's raw message
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// == Tracing Sink ==
/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event.outcome {
            AuditOutcome::Success | AuditOutcome::CacheHit => info!(
                target: "audit",
                service = %event.service_id,
                operation = %event.operation,
                identity = %event.identity,
                outcome = ?event.outcome,
                latency_ms = event.latency_ms,
                "gateway call"
            ),
            _ => warn!(
                target: "audit",
                service = %event.service_id,
                operation = %event.operation,
                identity = %event.identity,
                outcome = ?event.outcome,
                latency_ms = event.latency_ms,
                error = event.error.as_deref().unwrap_or(""),
                "gateway call"
            ),
        }
    }
}

// == Channel Sink ==
/// Forwards audit events to an unbounded channel, e.g. for a shipping task.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Creates the sink and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event);
    }
}
