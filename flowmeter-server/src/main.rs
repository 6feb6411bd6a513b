//! Flowmeter Server - LoRa flowmeter telemetry receiver
//!
//! Architecture:
//! - Axum HTTP server receives JSON readings from the LoRa gateway
//! - Each reading is coerced, classified and appended to a storage sink
//! - The sink (JSON Lines file, ClickHouse or in-memory) is chosen at startup
//!
//! # Usage
//!
//! ```bash
//! # Append rows to ./data/flowmeter.jsonl
//! cargo run --bin flowmeter-server
//!
//! # Store rows in ClickHouse
//! SINK=clickhouse CLICKHOUSE_URL=http://localhost:8123 cargo run --bin flowmeter-server
//! ```

mod config;
mod error;
mod routes;
mod sink;

use std::net::SocketAddr;

use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::routes::{router, AppState};
use crate::sink::build_sink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    info!("Starting Flowmeter Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    // Storage sink is acquired once and shared by every request
    let sink = build_sink(&config).await?;

    let state = AppState {
        sink,
        strict_status_codes: config.strict_status_codes,
    };
    let app = router(state, config.request_timeout());

    // Start server
    let addr: SocketAddr = config.server_addr().parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
