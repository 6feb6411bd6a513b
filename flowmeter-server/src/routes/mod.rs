//! HTTP route handlers.

pub mod health;
pub mod ingest;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::sink::StorageSink;

pub use health::{health, ready};
pub use ingest::ingest;
pub use status::status;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<dyn StorageSink>,
    pub strict_status_codes: bool,
}

/// Build the application router
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Status and ingestion share the root path
        .route("/", get(status).post(ingest))
        // Health checks
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Middleware
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
