use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use hostline_agent::SharedSession;
use hostline_core::config::{StorageConfig, StorageKind};
use hostline_core::domain::call::{CallRecord, CallStatus};
use hostline_core::errors::ApplicationError;
use hostline_db::CallRecordRepository;

/// Persists finished calls: always to the database, and as JSON files for local storage.
#[derive(Clone)]
pub struct CallExporter {
    repository: Arc<dyn CallRecordRepository>,
    local_dir: Option<PathBuf>,
}

impl CallExporter {
    pub fn new(repository: Arc<dyn CallRecordRepository>, storage: &StorageConfig) -> Self {
        let local_dir = match storage.kind {
            StorageKind::Local => Some(storage.local_path.clone()),
            StorageKind::Database => None,
        };
        Self { repository, local_dir }
    }

    pub async fn export(&self, record: &CallRecord) -> Result<(), ApplicationError> {
        let stored = self
            .repository
            .save(record)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        if !stored {
            warn!(
                event_name = "system.calls.export_skipped",
                correlation_id = %record.call_sid,
                status = record.status.as_str(),
                "call already stored as completed"
            );
            return Ok(());
        }

        if let Some(dir) = &self.local_dir {
            let path = dir.join(format!("{}.json", record.call_sid));
            let body = serde_json::to_vec_pretty(record)
                .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
            write_file(dir, &path, body).await.map_err(|error| {
                ApplicationError::Persistence(format!("{}: {error}", path.display()))
            })?;
        }

        info!(
            event_name = "system.calls.exported",
            correlation_id = %record.call_sid,
            call_sid = %record.call_sid,
            status = record.status.as_str(),
            turns = record.transcript.len(),
            actions = record.actions.len(),
            "call record exported"
        );
        Ok(())
    }

    /// Closes each session with `status` and exports it. Failures are logged per call.
    pub async fn finish_all(&self, sessions: Vec<SharedSession>, status: CallStatus) -> usize {
        let mut exported = 0;
        for handle in sessions {
            let record = handle.lock().await.finish(status, Utc::now(), None);
            match self.export(&record).await {
                Ok(()) => exported += 1,
                Err(err) => error!(
                    event_name = "system.calls.export_failed",
                    correlation_id = %record.call_sid,
                    error = %err,
                    "call record export failed"
                ),
            }
        }
        exported
    }
}

async fn write_file(dir: &Path, path: &Path, body: Vec<u8>) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, body).await
}
