//! In-process sink for dry runs and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use flowmeter_common::TelemetryRow;

use super::{SinkError, StorageSink};

#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<TelemetryRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows appended so far
    pub fn rows(&self) -> Vec<TelemetryRow> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append_row(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))?;
        rows.push(row.clone());
        Ok(())
    }
}
