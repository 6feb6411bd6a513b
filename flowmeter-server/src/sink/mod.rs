//! Append-only row storage.
//!
//! Every backend implements [`StorageSink`]. Rows are appended in call
//! order and each append either writes the whole row or fails.

pub mod clickhouse;
pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use flowmeter_common::TelemetryRow;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, SinkKind};

pub use self::clickhouse::ClickHouseSink;
pub use file::FileSink;
pub use memory::MemorySink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode row: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] ::clickhouse::error::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Destination for classified readings
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Append one row
    async fn append_row(&self, row: &TelemetryRow) -> Result<(), SinkError>;

    /// Check that the backend can accept writes
    async fn check(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Build the configured sink once at startup
pub async fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn StorageSink>> {
    let sink: Arc<dyn StorageSink> = match config.sink_kind()? {
        SinkKind::File => {
            let sink = FileSink::new(&config.sink_path);
            info!("Appending rows to {}", sink.path().display());
            Arc::new(sink)
        }
        SinkKind::Memory => Arc::new(MemorySink::new()),
        SinkKind::ClickHouse => {
            let sink = ClickHouseSink::new(config);
            sink.init_schema().await?;
            Arc::new(sink)
        }
    };

    info!("Using {} storage sink", sink.name());
    Ok(sink)
}
