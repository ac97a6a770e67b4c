//! Error types for the integration gateway
//!
//! Provides unified error handling using thiserror. `CacheError` is advisory
//! and never escapes `Gateway::invoke`; `GatewayError` is the small, stable set
//! of typed failures callers of the gateway observe.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::gateway::{DownstreamError, DownstreamErrorKind};
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Errors surfaced by cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Invalid key, TTL, pattern or value
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cache is full and eviction failed
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// A value or cache key could not be serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// == Gateway Error Enum ==
/// Typed failures returned by `Gateway::invoke`.
///
/// `Display` never contains the downstream's raw error message; the original
/// failure is reachable through `std::error::Error::source` for logging.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The identity exhausted its quota for this service
    #[error("Rate limit exceeded for '{identity}' on service '{service}', retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Downstream service the quota is scoped to
        service: String,
        /// Rate-limited identity
        identity: String,
        /// Seconds until the current window resets
        retry_after_secs: u64,
    },

    /// The service's circuit breaker rejected the call
    #[error("Circuit open for service '{service}'")]
    CircuitOpen {
        /// Downstream service whose breaker is open
        service: String,
        /// Unix milliseconds of the next recovery probe, None while forced open
        next_probe_at: Option<u64>,
    },

    /// The downstream collaborator failed
    #[error("Downstream call {service}.{operation} failed ({kind})")]
    Downstream {
        /// Downstream service
        service: String,
        /// Operation name
        operation: String,
        /// Classification supplied by the invoker
        kind: DownstreamErrorKind,
        /// Original failure, kept for logging
        #[source]
        source: DownstreamError,
    },

    /// The downstream call did not complete within the per-call timeout
    #[error("Downstream call {service}.{operation} timed out after {timeout:?}")]
    Timeout {
        /// Downstream service
        service: String,
        /// Operation name
        operation: String,
        /// Timeout that elapsed
        timeout: Duration,
        /// Original failure, kept for logging
        #[source]
        source: DownstreamError,
    },

    /// No invoker is registered for the service
    #[error("Unknown service: {0}")]
    UnknownService(String),
}

impl GatewayError {
    /// Builds the normalized error for a failed downstream call.
    ///
    /// `call_timeout` is reported for timeouts the invoker raised without a
    /// duration of its own.
    pub fn from_downstream(
        service: &str,
        operation: &str,
        err: DownstreamError,
        call_timeout: Duration,
    ) -> Self {
        match err.kind() {
            DownstreamErrorKind::Timeout => GatewayError::Timeout {
                service: service.to_string(),
                operation: operation.to_string(),
                timeout: err.timeout().unwrap_or(call_timeout),
                source: err,
            },
            kind => GatewayError::Downstream {
                service: service.to_string(),
                operation: operation.to_string(),
                kind,
                source: err,
            },
        }
    }

    /// How long the caller should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            GatewayError::CircuitOpen {
                next_probe_at: Some(at),
                ..
            } => {
                let now = crate::cache::current_timestamp_ms();
                Some(Duration::from_millis(at.saturating_sub(now)))
            }
            _ => None,
        }
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::RateLimitExceeded { .. } => true,
            GatewayError::CircuitOpen { next_probe_at, .. } => next_probe_at.is_some(),
            GatewayError::Downstream { kind, .. } => kind.is_retryable(),
            GatewayError::Timeout { .. } => true,
            GatewayError::UnknownService(_) => false,
        }
    }
}

// == IntoResponse Implementations ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::CacheFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Downstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
        };
        let retry_after = self.retry_after();

        let mut response = (status, Json(ErrorResponse::new(self.to_string()))).into_response();
        if let Some(wait) = retry_after {
            // Retry-After is whole seconds; round up so clients never retry early
            let secs = (wait.as_millis() as u64).div_ceil(1000);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
