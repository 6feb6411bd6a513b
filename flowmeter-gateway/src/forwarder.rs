//! Reading forwarders.
//!
//! HTTP forwarder posts readings to the flowmeter receiver.
//! File spool is a fallback for when the receiver is unreachable.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Url};
use serde_json::Value;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use flowmeter_common::{IngestPayload, LoraPacket};

use crate::config;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("receiver returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("receiver rejected reading: {0}")]
    Rejected(String),

    #[error("receiver redirected to {0}")]
    Redirected(String),

    #[error("spool write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode reading: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for decoded readings
#[async_trait]
pub trait ReadingForwarder: Send {
    async fn forward(&mut self, payload: &IngestPayload) -> Result<(), ForwardError>;
}

/// HTTP forwarder (for the flowmeter receiver)
pub struct HttpForwarder {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(endpoint: &str) -> Result<Self, ForwardError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|_| ForwardError::InvalidEndpoint(endpoint.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config::get_request_timeout())
            .connect_timeout(config::get_connect_timeout())
            .redirect(Policy::limited(config::MAX_REDIRECTS))
            .build()?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ReadingForwarder for HttpForwarder {
    async fn forward(&mut self, payload: &IngestPayload) -> Result<(), ForwardError> {
        debug!("Posting {} to {}", serde_json::to_string(payload)?, self.endpoint);

        let response = self.client
            .post(self.endpoint.clone())
            .json(payload)
            .send()
            .await?;

        // A redirected POST arrives as a GET on the status page, so the
        // reading never reached the ingestion handler
        if response.url() != &self.endpoint {
            warn!(
                "Receiver redirected to {} - update the configured endpoint",
                response.url()
            );
            return Err(ForwardError::Redirected(response.url().to_string()));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ForwardError::Status { status: status.as_u16(), body });
        }

        // The receiver reports logical failures in the body
        let envelope = serde_json::from_str::<Value>(&body)
            .map_err(|_| ForwardError::Rejected(format!("unexpected reply: {}", body)))?;

        if envelope["status"] != "success" {
            let message = envelope["message"].as_str().unwrap_or("unknown error");
            return Err(ForwardError::Rejected(message.to_string()));
        }

        info!(
            "Receiver accepted reading (quality: {})",
            envelope["debug"]["data_quality"].as_str().unwrap_or("unknown")
        );
        Ok(())
    }
}

/// File spool (fallback destination)
pub struct FileSpool {
    path: PathBuf,
}

impl FileSpool {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Ensure the parent directory exists
    pub async fn ensure_dir(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingForwarder for FileSpool {
    async fn forward(&mut self, payload: &IngestPayload) -> Result<(), ForwardError> {
        self.ensure_dir().await?;

        let mut line = serde_json::to_string(payload)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Spooled reading to {}", self.path.display());
        Ok(())
    }
}

/// Combined forwarder that tries HTTP first, falls back to the spool
pub struct FallbackForwarder {
    http: Option<HttpForwarder>,
    spool: FileSpool,
}

impl FallbackForwarder {
    pub fn new(http: Option<HttpForwarder>, spool_path: PathBuf) -> Self {
        Self {
            http,
            spool: FileSpool::new(spool_path),
        }
    }
}

#[async_trait]
impl ReadingForwarder for FallbackForwarder {
    async fn forward(&mut self, payload: &IngestPayload) -> Result<(), ForwardError> {
        if let Some(ref mut http) = self.http {
            match http.forward(payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Forwarding failed ({}), spooling reading", e);
                }
            }
        }

        self.spool.forward(payload).await
    }
}

/// Forward every queued packet until the channel closes
pub async fn run_forwarder<F: ReadingForwarder>(
    mut packet_rx: mpsc::Receiver<LoraPacket>,
    mut forwarder: F,
) {
    while let Some(packet) = packet_rx.recv().await {
        let payload = packet.to_payload();
        if let Err(e) = forwarder.forward(&payload).await {
            error!("Dropped reading {}: {}", packet.sender_timestamp, e);
        }
    }

    info!("Forwarder stopped");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::State,
        http::{header, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    use super::*;

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn spawn_receiver(status: StatusCode, reply: Value) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/",
                post(move |State(seen): State<Received>, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        seen.lock().unwrap().push(body);
                        (status, Json(reply))
                    }
                }),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{addr}/"), received)
    }

    /// Receiver that moved: POST `/old` answers 302 to `/`, which only serves
    /// the plain-text status page
    async fn spawn_moved_receiver() -> String {
        let router = Router::new()
            .route(
                "/old",
                post(|| async { (StatusCode::FOUND, [(header::LOCATION, "/")]) }),
            )
            .route("/", get(|| async { "LoRa Flowmeter Data Receiver is running" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{addr}/old")
    }

    fn payload() -> IngestPayload {
        IngestPayload {
            timestamp: 1000,
            avg_flow_rate: 2.5,
            std_flow_rate: 0.5,
        }
    }

    async fn spooled_lines(path: &std::path::Path) -> Vec<Value> {
        tokio::fs::read_to_string(path)
            .await
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_http_forwarder_posts_json() {
        let (url, received) = spawn_receiver(
            StatusCode::OK,
            json!({"status": "success", "debug": {"data_quality": "Good"}}),
        )
        .await;

        let mut forwarder = HttpForwarder::new(&url).unwrap();
        forwarder.forward(&payload()).await.unwrap();

        let seen = received.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], json!({"timestamp": 1000, "avg_flow_rate": 2.5, "std_flow_rate": 0.5}));
    }

    #[tokio::test]
    async fn test_error_envelope_is_rejection() {
        let (url, _) = spawn_receiver(
            StatusCode::OK,
            json!({"status": "error", "message": "failed to append row: disk full"}),
        )
        .await;

        let mut forwarder = HttpForwarder::new(&url).unwrap();
        let err = forwarder.forward(&payload()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Rejected(ref m) if m.contains("disk full")));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, _) = spawn_receiver(StatusCode::BAD_GATEWAY, json!({"status": "error"})).await;

        let mut forwarder = HttpForwarder::new(&url).unwrap();
        let err = forwarder.forward(&payload()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_non_json_reply_is_rejection() {
        let (url, _) = spawn_receiver(StatusCode::OK, json!("accepted")).await;

        let mut forwarder = HttpForwarder::new(&url).unwrap();
        let err = forwarder.forward(&payload()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_redirect_is_failure() {
        let url = spawn_moved_receiver().await;

        let mut forwarder = HttpForwarder::new(&url).unwrap();
        let err = forwarder.forward(&payload()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Redirected(ref to) if to.ends_with('/')));
    }

    #[tokio::test]
    async fn test_fallback_spools_when_redirected() {
        let url = spawn_moved_receiver().await;
        let dir = tempfile::tempdir().unwrap();
        let spool_path = dir.path().join("readings.jsonl");

        let http = HttpForwarder::new(&url).unwrap();
        let mut forwarder = FallbackForwarder::new(Some(http), spool_path.clone());
        forwarder.forward(&payload()).await.unwrap();

        let lines = spooled_lines(&spool_path).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["timestamp"], 1000);
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            HttpForwarder::new("not a url"),
            Err(ForwardError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_spools_when_receiver_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let spool_path = dir.path().join("spool").join("readings.jsonl");

        // nothing listens on port 1
        let http = HttpForwarder::new("http://127.0.0.1:1/").unwrap();
        let mut forwarder = FallbackForwarder::new(Some(http), spool_path.clone());

        forwarder.forward(&payload()).await.unwrap();
        forwarder.forward(&payload()).await.unwrap();

        let lines = spooled_lines(&spool_path).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["timestamp"], 1000);
    }

    #[tokio::test]
    async fn test_fallback_skips_spool_on_success() {
        let (url, received) = spawn_receiver(StatusCode::OK, json!({"status": "success"})).await;
        let dir = tempfile::tempdir().unwrap();
        let spool_path = dir.path().join("readings.jsonl");

        let mut forwarder = FallbackForwarder::new(Some(HttpForwarder::new(&url).unwrap()), spool_path.clone());
        forwarder.forward(&payload()).await.unwrap();

        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(spooled_lines(&spool_path).await.is_empty());
    }

    #[tokio::test]
    async fn test_run_forwarder_drains_channel() {
        let dir = tempfile::tempdir().unwrap();
        let spool_path = dir.path().join("readings.jsonl");
        let (tx, rx) = mpsc::channel(4);

        for ts in [1u32, 2, 3] {
            tx.send(LoraPacket { sender_timestamp: ts, avg_flow_rate: 1.0, std_flow_rate: 0.0 })
                .await
                .unwrap();
        }
        drop(tx);

        run_forwarder(rx, FallbackForwarder::new(None, spool_path.clone())).await;

        let timestamps: Vec<u64> = spooled_lines(&spool_path)
            .await
            .iter()
            .map(|l| l["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
    }
}
