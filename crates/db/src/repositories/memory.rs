use std::collections::HashMap;

use tokio::sync::RwLock;

use hostline_core::domain::call::{CallRecord, CallSid, CallStatus};

use super::{CallRecordRepository, RepositoryError};

/// Keeps exported call records in process memory; used by tests and the `chat` command.
#[derive(Default)]
pub struct InMemoryCallRecordRepository {
    records: RwLock<HashMap<String, CallRecord>>,
}

impl InMemoryCallRecordRepository {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl CallRecordRepository for InMemoryCallRecordRepository {
    async fn save(&self, record: &CallRecord) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        let downgrade = records.get(&record.call_sid.0).is_some_and(|stored| {
            stored.status == CallStatus::Completed && record.status != CallStatus::Completed
        });
        if downgrade {
            return Ok(false);
        }
        records.insert(record.call_sid.0.clone(), record.clone());
        Ok(true)
    }

    async fn find(&self, call_sid: &CallSid) -> Result<Option<CallRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&call_sid.0).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hostline_core::domain::call::{CallRecord, CallSid, CallStatus};

    use super::InMemoryCallRecordRepository;
    use crate::repositories::CallRecordRepository;

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let repo = InMemoryCallRecordRepository::default();
        let mut record = CallRecord {
            call_sid: CallSid("CA-mem".to_string()),
            caller: Some("+15550100".to_string()),
            callee: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            status: CallStatus::InProgress,
            transcript: Vec::new(),
            actions: Vec::new(),
        };

        repo.save(&record).await.expect("save");
        record.status = CallStatus::Completed;
        repo.save(&record).await.expect("save again");

        let stored = repo.find(&record.call_sid).await.expect("find").expect("present");
        assert_eq!(stored.status, CallStatus::Completed);
        assert_eq!(repo.len().await, 1);
        assert!(repo.find(&CallSid("CA-other".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn completed_snapshot_survives_a_failed_one() {
        let repo = InMemoryCallRecordRepository::default();
        let record = CallRecord {
            call_sid: CallSid("CA-done".to_string()),
            caller: None,
            callee: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: Some(12),
            status: CallStatus::Completed,
            transcript: Vec::new(),
            actions: Vec::new(),
        };
        assert!(repo.save(&record).await.expect("save"));

        let mut late = record.clone();
        late.status = CallStatus::Failed;
        late.duration_seconds = None;
        assert!(!repo.save(&late).await.expect("save failed"));

        let stored = repo.find(&record.call_sid).await.expect("find").expect("present");
        assert_eq!(stored.status, CallStatus::Completed);
        assert_eq!(stored.duration_seconds, Some(12));
    }
}
