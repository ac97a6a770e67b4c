//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_stats_handler, clear_cache_handler, close_breaker_handler, export_cache_handler,
    get_breaker_handler, health_handler, import_cache_handler, list_breakers_handler,
    open_breaker_handler, rate_limit_status_handler, reset_all_rate_limits_handler,
    reset_breaker_handler, reset_rate_limit_handler, AppState,
};

/// Creates the admin router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check with open circuits
/// - `GET /breakers` - Every breaker's snapshot
/// - `GET /breakers/:service` - One breaker's snapshot
/// - `POST /breakers/:service/open|close|reset` - Operator overrides
/// - `GET /rate-limits/:identity` - Live windows of an identity
/// - `DELETE /rate-limits/:identity` - Reset an identity's windows
/// - `DELETE /rate-limits` - Reset every window
/// - `GET /cache/stats` - Cache metrics
/// - `GET /cache/export` - Snapshot of live entries
/// - `POST /cache/import` - Load a snapshot
/// - `DELETE /cache` - Remove every entry
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/breakers", get(list_breakers_handler))
        .route("/breakers/:service", get(get_breaker_handler))
        .route("/breakers/:service/open", post(open_breaker_handler))
        .route("/breakers/:service/close", post(close_breaker_handler))
        .route("/breakers/:service/reset", post(reset_breaker_handler))
        .route("/rate-limits", delete(reset_all_rate_limits_handler))
        .route(
            "/rate-limits/:identity",
            get(rate_limit_status_handler).delete(reset_rate_limit_handler),
        )
        .route("/cache", delete(clear_cache_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/cache/export", get(export_cache_handler))
        .route("/cache/import", post(import_cache_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
