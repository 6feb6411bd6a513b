//! Configuration for the flowmeter receiver.
//!
//! All configuration is read from environment variables.

use std::env;
use std::time::Duration;

/// Storage backend selected by `SINK`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    ClickHouse,
    Memory,
}

impl SinkKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(SinkKind::File),
            "clickhouse" => Some(SinkKind::ClickHouse),
            "memory" => Some(SinkKind::Memory),
            _ => None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// Storage backend name (`file`, `clickhouse`, `memory`)
    pub sink: String,

    /// Row file for the file sink
    pub sink_path: String,

    /// ClickHouse URL
    pub clickhouse_url: String,

    /// ClickHouse database name
    pub clickhouse_database: String,

    /// ClickHouse table name
    pub clickhouse_table: String,

    /// Per-request timeout enforced by the transport layer
    pub request_timeout_secs: u64,

    /// Reflect ingestion failures in the HTTP status instead of always 200
    pub strict_status_codes: bool,

    /// Log level
    pub log_level: String,

    /// Enable JSON logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
        };

        Self {
            host: string("HOST", "0.0.0.0"),
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            sink: string("SINK", "file"),
            sink_path: string("SINK_PATH", "data/flowmeter.jsonl"),
            clickhouse_url: string("CLICKHOUSE_URL", "http://localhost:8123"),
            clickhouse_database: string("CLICKHOUSE_DATABASE", "flowmeter"),
            clickhouse_table: string("CLICKHOUSE_TABLE", "readings"),
            request_timeout_secs: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            strict_status_codes: flag("STRICT_STATUS_CODES"),
            log_level: string("LOG_LEVEL", "info"),
            log_json: flag("LOG_JSON"),
        }
    }

    /// Get the full server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the configured storage backend
    pub fn sink_kind(&self) -> anyhow::Result<SinkKind> {
        SinkKind::parse(&self.sink)
            .ok_or_else(|| anyhow::anyhow!("unknown SINK '{}' (expected file, clickhouse or memory)", self.sink))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
