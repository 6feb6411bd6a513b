//! ClickHouse sink - writes each row with a single INSERT.

use ::clickhouse::{Client, Row};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use flowmeter_common::TelemetryRow;

use super::{SinkError, StorageSink};
use crate::config::Config;

/// Flattened row for ClickHouse storage
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StoredReading {
    /// Receipt time, milliseconds since the Unix epoch (DateTime64(3))
    pub server_timestamp: i64,

    pub sender_timestamp: f64,

    pub avg_flow_rate: f64,

    pub std_flow_rate: f64,

    pub data_quality: String,

    pub device_type: String,
}

impl From<&TelemetryRow> for StoredReading {
    fn from(row: &TelemetryRow) -> Self {
        let TelemetryRow(server_ts, sender_ts, avg, std_rate, quality, device_type) = row;
        Self {
            server_timestamp: server_ts.timestamp_millis(),
            sender_timestamp: *sender_ts,
            avg_flow_rate: *avg,
            std_flow_rate: *std_rate,
            data_quality: quality.as_str().to_string(),
            device_type: device_type.clone(),
        }
    }
}

pub struct ClickHouseSink {
    client: Client,
    table: String,
}

impl ClickHouseSink {
    pub fn new(config: &Config) -> Self {
        info!("Connecting to ClickHouse at {}", config.clickhouse_url);
        let client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_database(&config.clickhouse_database);

        Self {
            client,
            table: config.clickhouse_table.clone(),
        }
    }

    /// Initialize the ClickHouse schema
    pub async fn init_schema(&self) -> Result<(), SinkError> {
        info!("Initializing ClickHouse schema");

        let create_table = format!(r#"
            CREATE TABLE IF NOT EXISTS {} (
                server_timestamp DateTime64(3),
                sender_timestamp Float64,
                avg_flow_rate Float64,
                std_flow_rate Float64,
                data_quality LowCardinality(String),
                device_type LowCardinality(String)
            ) ENGINE = MergeTree()
            ORDER BY (server_timestamp, device_type)
            PARTITION BY toYYYYMM(server_timestamp)
        "#, self.table);

        self.client.query(&create_table).execute().await?;
        info!("ClickHouse schema initialized");

        Ok(())
    }
}

#[async_trait]
impl StorageSink for ClickHouseSink {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn append_row(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let stored = StoredReading::from(row);

        let mut insert = self.client.insert(&self.table)?;
        insert.write(&stored).await?;
        insert.end().await?;

        debug!("Inserted row into {}", self.table);
        Ok(())
    }

    async fn check(&self) -> Result<(), SinkError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }
}
