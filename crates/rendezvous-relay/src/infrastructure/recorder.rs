//! SessionRecorder backends.
//!
//! - [`LogRecorder`] writes each pairing to the tracing log.  It is the default
//!   when no record file is configured.
//! - [`JsonLinesRecorder`] appends one JSON document per pairing to a file:
//!
//! ```text
//! {"caller":"B","receiver":"A","timestamp":1700000000000}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::application::recorder::{PairingRecord, RecorderError, SessionRecorder};

/// Records pairings to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

#[async_trait]
impl SessionRecorder for LogRecorder {
    async fn record(&self, record: PairingRecord) -> Result<(), RecorderError> {
        info!(
            caller = %record.caller,
            receiver = %record.callee,
            timestamp = record.timestamp_ms,
            "pairing"
        );
        Ok(())
    }
}

/// Appends pairings to a JSON-lines file.
///
/// Writes are serialized through an internal lock so concurrent pairings never
/// interleave within a line.  The file is opened per write, which keeps the
/// recorder correct across external log rotation.
#[derive(Debug)]
pub struct JsonLinesRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionRecorder for JsonLinesRecorder {
    async fn record(&self, record: PairingRecord) -> Result<(), RecorderError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let io_err = |source| RecorderError::Io {
            path: self.path.clone(),
            source,
        };

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("rendezvous-records-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_log_recorder_always_succeeds() {
        let result = LogRecorder
            .record(PairingRecord::now("B".into(), "A".into()))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_json_lines_recorder_appends_one_line_per_record() {
        let path = temp_path();
        let recorder = JsonLinesRecorder::new(&path);

        recorder
            .record(PairingRecord { caller: "B".into(), callee: "A".into(), timestamp_ms: 1 })
            .await
            .unwrap();
        recorder
            .record(PairingRecord { caller: "D".into(), callee: "C".into(), timestamp_ms: 2 })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["caller"], "B");
        assert_eq!(lines[0]["receiver"], "A");
        assert_eq!(lines[1]["timestamp"], 2);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_json_lines_recorder_reports_io_error() {
        // A directory that does not exist cannot hold the file.
        let path = std::env::temp_dir()
            .join(format!("missing-{}", uuid::Uuid::new_v4()))
            .join("records.jsonl");
        let recorder = JsonLinesRecorder::new(&path);

        let result = recorder.record(PairingRecord::now("B".into(), "A".into())).await;

        assert!(matches!(result, Err(RecorderError::Io { .. })));
    }
}
