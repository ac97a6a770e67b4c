//! API Handlers
//!
//! HTTP request handlers for the operator admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::breaker::{BreakerSnapshot, CircuitState};
use crate::error::{CacheError, GatewayError, Result};
use crate::gateway::Gateway;
use crate::models::{
    ExportResponse, HealthResponse, ImportRequest, ImportResponse, RateLimitStatusResponse,
    RateLimitWindowStatus, ResetResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The gateway whose components are administered
    pub gateway: Arc<Gateway>,
}

impl AppState {
    /// Creates a new AppState around a gateway.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

/// Handler for GET /health
///
/// Reports registered services and any circuit that is not closed.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let open_circuits = state
        .gateway
        .breakers()
        .snapshots()
        .into_iter()
        .filter(|snapshot| snapshot.state != CircuitState::Closed)
        .map(|snapshot| snapshot.service)
        .collect();

    Json(HealthResponse::new(state.gateway.services(), open_circuits))
}

// == Breakers ==
/// Handler for GET /breakers
pub async fn list_breakers_handler(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.gateway.breakers().snapshots())
}

/// Handler for GET /breakers/:service
///
/// Registered services without traffic yet report a fresh CLOSED breaker.
pub async fn get_breaker_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> std::result::Result<Json<BreakerSnapshot>, GatewayError> {
    let breakers = state.gateway.breakers();
    if let Some(snapshot) = breakers.snapshot(&service) {
        return Ok(Json(snapshot));
    }
    require_service(&state, &service)?;
    Ok(Json(breakers.get_or_create(&service).snapshot()))
}

/// Handler for POST /breakers/:service/open
pub async fn open_breaker_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> std::result::Result<Json<BreakerSnapshot>, GatewayError> {
    require_service(&state, &service)?;
    Ok(Json(state.gateway.breakers().force_open(&service)))
}

/// Handler for POST /breakers/:service/close
pub async fn close_breaker_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> std::result::Result<Json<BreakerSnapshot>, GatewayError> {
    require_service(&state, &service)?;
    Ok(Json(state.gateway.breakers().force_close(&service)))
}

/// Handler for POST /breakers/:service/reset
pub async fn reset_breaker_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> std::result::Result<Json<BreakerSnapshot>, GatewayError> {
    require_service(&state, &service)?;
    Ok(Json(state.gateway.breakers().reset(&service)))
}

fn require_service(state: &AppState, service: &str) -> std::result::Result<(), GatewayError> {
    if state.gateway.has_service(service) {
        Ok(())
    } else {
        Err(GatewayError::UnknownService(service.to_string()))
    }
}

// == Rate Limits ==
/// Handler for GET /rate-limits/:identity
pub async fn rate_limit_status_handler(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Json<RateLimitStatusResponse> {
    let windows = state
        .gateway
        .rate_limit_status(&identity)
        .iter()
        .map(|(service, window)| RateLimitWindowStatus::new(service.as_str(), window))
        .collect();

    Json(RateLimitStatusResponse { identity, windows })
}

/// Handler for DELETE /rate-limits/:identity
pub async fn reset_rate_limit_handler(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Json<ResetResponse> {
    let cleared = state.gateway.reset_rate_limits(&identity);
    Json(ResetResponse::new(
        format!("Rate limits for '{}' reset", identity),
        cleared,
    ))
}

/// Handler for DELETE /rate-limits
pub async fn reset_all_rate_limits_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    let cleared = state.gateway.limiter().reset_all();
    Json(ResetResponse::new("All rate limits reset", cleared))
}

// == Cache ==
/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    // Acquire read lock for stats
    let cache = state.gateway.cache().read().await;
    Json(StatsResponse::from(cache.metrics()))
}

/// Handler for GET /cache/export
pub async fn export_cache_handler(State(state): State<AppState>) -> Json<ExportResponse> {
    let cache = state.gateway.cache().read().await;
    Json(ExportResponse::new(cache.export_data()))
}

/// Handler for POST /cache/import
pub async fn import_cache_handler(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut cache = state.gateway.cache().write().await;
    let imported = cache.import_data(req.entries)?;

    Ok(Json(ImportResponse { imported }))
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(State(state): State<AppState>) -> Json<ResetResponse> {
    let mut cache = state.gateway.cache().write().await;
    let cleared = cache.len();
    cache.clear();
    Json(ResetResponse::new("Cache cleared", cleared))
}
