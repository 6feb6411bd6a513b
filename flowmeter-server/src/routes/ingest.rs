//! Telemetry ingestion endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use flowmeter_common::{
    format_timestamp, DataQuality, TelemetryReading, FIELD_AVG_FLOW_RATE, FIELD_STD_FLOW_RATE,
    FIELD_TIMESTAMP,
};

use super::AppState;
use crate::error::IngestError;

pub const SUCCESS_MESSAGE: &str = "Flowmeter data added successfully";

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub debug: SuccessDebug,
    pub server_timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessDebug {
    pub received_keys: Vec<String>,
    pub sender_timestamp: f64,
    pub avg_flow_rate: f64,
    pub std_flow_rate: f64,
    pub data_quality: DataQuality,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    pub debug: ErrorDebug,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDebug {
    pub error: String,
    pub has_post_data: bool,
    pub post_data_type: String,
    pub post_data_length: usize,
    pub raw_data: String,
}

impl ErrorDebug {
    fn new(err: &IngestError, content_type: Option<&str>, body: &[u8]) -> Self {
        let has_post_data = !body.is_empty();
        Self {
            error: err.to_string(),
            has_post_data,
            post_data_type: content_type.unwrap_or("none").to_string(),
            post_data_length: body.len(),
            raw_data: if has_post_data {
                String::from_utf8_lossy(body).into_owned()
            } else {
                "none".to_string()
            },
        }
    }
}

/// POST / - Classify a reading and append it to the sink
pub async fn ingest(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    info!(
        content_type = content_type.unwrap_or("none"),
        length = body.len(),
        "Received flowmeter payload"
    );
    debug!("Raw request body: {}", String::from_utf8_lossy(&body));

    match process(&state, &body).await {
        Ok((reading, received_keys)) => {
            let response = SuccessResponse {
                status: "success",
                message: SUCCESS_MESSAGE,
                debug: SuccessDebug {
                    received_keys,
                    sender_timestamp: reading.sender_timestamp,
                    avg_flow_rate: reading.avg_flow_rate,
                    std_flow_rate: reading.std_flow_rate,
                    data_quality: reading.data_quality,
                },
                server_timestamp: format_timestamp(&reading.server_timestamp),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!(error = %err, "Failed to ingest flowmeter payload");

            let status = if state.strict_status_codes {
                err.status_code()
            } else {
                StatusCode::OK
            };
            let response = ErrorResponse {
                status: "error",
                message: err.to_string(),
                debug: ErrorDebug::new(&err, content_type, &body),
            };
            (status, Json(response)).into_response()
        }
    }
}

/// Parse, classify and store one payload
async fn process(
    state: &AppState,
    body: &[u8],
) -> Result<(TelemetryReading, Vec<String>), IngestError> {
    if body.is_empty() {
        return Err(IngestError::Parse("request body is empty".to_string()));
    }

    let payload: Value = serde_json::from_slice(body)?;
    if payload.is_null() {
        return Err(IngestError::Payload("body is JSON null".to_string()));
    }

    let received_keys: Vec<String> = payload
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    debug!(keys = ?received_keys, "Parsed JSON payload");

    let reading = TelemetryReading::from_payload(&payload, Utc::now());
    log_extraction(&payload, &reading);

    state.sink.append_row(&reading.to_row()).await?;
    info!(
        sender_timestamp = reading.sender_timestamp,
        avg_flow_rate = reading.avg_flow_rate,
        std_flow_rate = reading.std_flow_rate,
        data_quality = %reading.data_quality,
        sink = state.sink.name(),
        "Appended flowmeter row"
    );

    Ok((reading, received_keys))
}

fn log_extraction(payload: &Value, reading: &TelemetryReading) {
    let fields = [
        (FIELD_TIMESTAMP, reading.sender_timestamp),
        (FIELD_AVG_FLOW_RATE, reading.avg_flow_rate),
        (FIELD_STD_FLOW_RATE, reading.std_flow_rate),
    ];

    for (name, extracted) in fields {
        match payload.get(name) {
            Some(raw) => debug!(field = name, raw = %raw, extracted, "Extracted field"),
            None => warn!(field = name, extracted, "Field missing, using sentinel"),
        }
    }
    debug!(data_quality = %reading.data_quality, "Classified reading");
}
