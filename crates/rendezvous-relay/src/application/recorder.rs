//! SessionRecorder: fire-and-forget persistence of successful pairings.
//!
//! The relay never waits for a recorder.  [`spawn_record`] hands the record to
//! a detached Tokio task and only logs the outcome, so a slow or failing
//! backend cannot delay a `SEND_OFFER` reply or any relayed frame.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ClientId;

/// One successful pairing.
///
/// Serializes as `{"timestamp":…, "caller":…, "receiver":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingRecord {
    /// Client id of the requester that was told to send the offer.
    pub caller: ClientId,
    /// Client id of the peer that was waiting.
    #[serde(rename = "receiver")]
    pub callee: ClientId,
    /// Milliseconds since the Unix epoch at match time.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl PairingRecord {
    /// Builds a record stamped with the current wall-clock time.
    pub fn now(caller: ClientId, callee: ClientId) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            caller,
            callee,
            timestamp_ms,
        }
    }
}

/// Errors a recorder backend can report.  They are logged, never propagated.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error writing pairing record to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize pairing record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Backend that persists pairing records.
///
/// Infrastructure implementations write to the log or to a file; tests use
/// the generated `MockSessionRecorder`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn record(&self, record: PairingRecord) -> Result<(), RecorderError>;
}

/// Records `record` on a detached task.
///
/// The returned handle may be dropped; the task keeps running and logs its
/// own result.
pub fn spawn_record(recorder: Arc<dyn SessionRecorder>, record: PairingRecord) -> JoinHandle<()> {
    tokio::spawn(async move {
        let caller = record.caller.clone();
        let callee = record.callee.clone();
        match recorder.record(record).await {
            Ok(()) => debug!(%caller, %callee, "pairing recorded"),
            Err(e) => warn!(%caller, %callee, "failed to record pairing: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_with_reference_field_names() {
        let record = PairingRecord {
            caller: "B".into(),
            callee: "A".into(),
            timestamp_ms: 1_700_000_000_000,
        };

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["caller"], "B");
        assert_eq!(json["receiver"], "A");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_record_now_has_recent_timestamp() {
        let record = PairingRecord::now("B".into(), "A".into());
        // 2020-01-01 in millis; anything earlier means the clock math is wrong.
        assert!(record.timestamp_ms > 1_577_836_800_000);
    }

    #[tokio::test]
    async fn test_spawn_record_calls_recorder_once() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));

        let mut mock = MockSessionRecorder::new();
        mock.expect_record().times(1).returning(move |record| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(record);
            }
            Ok(())
        });

        let handle = spawn_record(Arc::new(mock), PairingRecord::now("B".into(), "A".into()));
        let seen = rx.await.unwrap();
        handle.await.unwrap();

        assert_eq!(seen.caller, ClientId::from("B"));
        assert_eq!(seen.callee, ClientId::from("A"));
    }

    #[tokio::test]
    async fn test_spawn_record_swallows_recorder_failure() {
        let mut mock = MockSessionRecorder::new();
        mock.expect_record()
            .times(1)
            .returning(|_| {
                Err(RecorderError::Io {
                    path: PathBuf::from("/pairings.jsonl"),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "backend down"),
                })
            });

        let handle = spawn_record(Arc::new(mock), PairingRecord::now("B".into(), "A".into()));

        // The task completes normally; the error only reaches the log.
        assert!(handle.await.is_ok());
    }
}
