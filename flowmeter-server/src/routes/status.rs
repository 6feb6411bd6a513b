//! Receiver status endpoint.

use axum::http::header;
use axum::response::IntoResponse;

pub const STATUS_TEXT: &str =
    "LoRa Flowmeter Data Receiver is running - Expects: timestamp, avg_flow_rate, std_flow_rate";

/// GET / - Fixed status line
pub async fn status() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], STATUS_TEXT)
}
