//! Ingestion failures reported in the error envelope.

use axum::http::StatusCode;
use thiserror::Error;

use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Body absent or not valid JSON
    #[error("invalid JSON body: {0}")]
    Parse(String),

    /// Valid JSON that carries no reading at all
    #[error("invalid payload: {0}")]
    Payload(String),

    /// The storage sink rejected the row
    #[error("failed to append row: {0}")]
    Sink(#[from] SinkError),
}

impl IngestError {
    /// HTTP status used when strict status codes are enabled
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Parse(_) | IngestError::Payload(_) => StatusCode::BAD_REQUEST,
            IngestError::Sink(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}
