//! JSON Lines file sink.
//!
//! Each row is written as a six-element JSON array on its own line.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flowmeter_common::TelemetryRow;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{SinkError, StorageSink};

pub struct FileSink {
    path: PathBuf,
    // serializes appends so concurrent requests never interleave lines
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    async fn ensure_dir(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

/// Append target that can be cut back to an earlier length
#[async_trait]
trait LineFile: AsyncWrite + Unpin + Send {
    async fn current_len(&mut self) -> io::Result<u64>;
    async fn truncate(&mut self, len: u64) -> io::Result<()>;
}

#[async_trait]
impl LineFile for File {
    async fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await
    }
}

/// Write one whole line or leave the file as it was
async fn append_line<F: LineFile>(file: &mut F, line: &[u8]) -> io::Result<()> {
    let start = file.current_len().await?;

    let written = match file.write_all(line).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        if let Err(truncate_err) = file.truncate(start).await {
            warn!("Could not remove partial line (length {}): {}", start, truncate_err);
        }
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl StorageSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append_row(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(row)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.ensure_dir().await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        append_line(&mut file, line.as_bytes()).await?;

        debug!("Appended row to {}", self.path.display());
        Ok(())
    }

    async fn check(&self) -> Result<(), SinkError> {
        self.ensure_dir().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use chrono::Utc;
    use flowmeter_common::TelemetryReading;
    use serde_json::{json, Value};

    fn row(avg: f64) -> TelemetryRow {
        TelemetryReading::from_payload(
            &json!({"timestamp": 1, "avg_flow_rate": avg, "std_flow_rate": 0.5}),
            Utc::now(),
        )
        .to_row()
    }

    #[tokio::test]
    async fn test_appends_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested").join("rows.jsonl"));

        sink.append_row(&row(1.0)).await.unwrap();
        sink.append_row(&row(2.0)).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][2], 1.0);
        assert_eq!(lines[1][2], 2.0);
        assert_eq!(lines[1][5], "flowmeter");
    }

    #[tokio::test]
    async fn test_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let sink = FileSink::new(dir.path());

        let err = sink.append_row(&row(1.0)).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }

    /// In-memory file that fails once `budget` bytes have been written
    struct ShortFile {
        data: Vec<u8>,
        budget: usize,
    }

    impl AsyncWrite for ShortFile {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if this.budget == 0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left")));
            }
            let n = buf.len().min(this.budget);
            this.data.extend_from_slice(&buf[..n]);
            this.budget -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl LineFile for ShortFile {
        async fn current_len(&mut self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        async fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_line() {
        let mut file = ShortFile {
            data: b"[\"earlier\"]\n".to_vec(),
            budget: 5,
        };

        let err = append_line(&mut file, b"[1,2,3,4,5,6]\n").await.unwrap_err();
        assert_eq!(err.to_string(), "no space left");
        assert_eq!(file.data, b"[\"earlier\"]\n");

        file.budget = 64;
        append_line(&mut file, b"[1]\n").await.unwrap();
        assert_eq!(file.data, b"[\"earlier\"]\n[1]\n");
    }
}
