//! Downstream Invoker
//!
//! The seam between the gateway and the systems it protects. Implementations
//! perform the actual call (HTTP client, SDK, queue) and classify failures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::breaker::TripsBreaker;

// == Invoker Trait ==
/// Performs one call against a downstream service.
#[async_trait]
pub trait DownstreamInvoker: Send + Sync {
    /// Calls `operation` on `service_id` with `payload`.
    async fn call(
        &self,
        service_id: &str,
        operation: &str,
        payload: &Value,
    ) -> Result<Value, DownstreamError>;
}

// == Error Classification ==
/// What went wrong with a downstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamErrorKind {
    /// Connection refused, DNS failure, service down
    Unavailable,
    /// The call did not complete in time
    Timeout,
    /// The service answered with a server-side error
    ServerError,
    /// The service rejected the request as malformed
    InvalidRequest,
}

impl DownstreamErrorKind {
    /// Whether the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownstreamErrorKind::InvalidRequest)
    }
}

impl fmt::Display for DownstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownstreamErrorKind::Unavailable => "unavailable",
            DownstreamErrorKind::Timeout => "timeout",
            DownstreamErrorKind::ServerError => "server_error",
            DownstreamErrorKind::InvalidRequest => "invalid_request",
        };
        f.write_str(name)
    }
}

// == Downstream Error ==
/// Failure reported by an invoker.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct DownstreamError {
    kind: DownstreamErrorKind,
    message: String,
    status: Option<u16>,
    timeout: Option<Duration>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DownstreamError {
    fn new(kind: DownstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            timeout: None,
            source: None,
        }
    }

    /// The service could not be reached.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(DownstreamErrorKind::Unavailable, message)
    }

    /// The service answered with `status`.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(DownstreamErrorKind::ServerError, message)
        }
    }

    /// The call exceeded `timeout`.
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new(
                DownstreamErrorKind::Timeout,
                format!("no response within {:?}", timeout),
            )
        }
    }

    /// The service rejected the request itself.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(DownstreamErrorKind::InvalidRequest, message)
    }

    /// Attaches the underlying error.
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Failure classification.
    pub fn kind(&self) -> DownstreamErrorKind {
        self.kind
    }

    /// Raw message from the invoker. Not meant for end users.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status code reported by the service, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Elapsed timeout for `Timeout` failures.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl TripsBreaker for DownstreamError {
    fn trips_breaker(&self) -> bool {
        self.kind != DownstreamErrorKind::InvalidRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DownstreamError::unavailable("down").trips_breaker());
        assert!(DownstreamError::server(500, "boom").trips_breaker());
        assert!(DownstreamError::timed_out(Duration::from_secs(1)).trips_breaker());
        assert!(!DownstreamError::invalid_request("bad").trips_breaker());
    }

    #[test]
    fn test_display_and_accessors() {
        let err = DownstreamError::server(502, "bad gateway");
        assert_eq!(err.to_string(), "server_error: bad gateway");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.message(), "bad gateway");
        assert!(err.timeout().is_none());
    }

    #[test]
    fn test_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DownstreamError::unavailable("connect failed").with_source(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "refused");
    }
}
