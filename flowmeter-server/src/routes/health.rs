//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sink: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health - Basic health check
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sink: state.sink.name(),
        error: None,
    })
}

/// GET /ready - Readiness check against the storage sink
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.sink.check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                version: env!("CARGO_PKG_VERSION"),
                sink: state.sink.name(),
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Sink {} not ready: {}", state.sink.name(), e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    version: env!("CARGO_PKG_VERSION"),
                    sink: state.sink.name(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
