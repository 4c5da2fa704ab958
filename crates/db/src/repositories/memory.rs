use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tokio::sync::RwLock;

use callsync_core::domain::call_record::{CallRecord, DedupeKey, TenantId, TranscriptionStatus};
use callsync_core::domain::sync_run::SyncRun;

use super::{
    BatchWriteSummary, CallRecordRepository, RepositoryError, SyncRunRepository, WriteOp,
};

#[derive(Default)]
pub struct InMemoryCallRecordRepository {
    records: RwLock<HashMap<DedupeKey, CallRecord>>,
}

impl InMemoryCallRecordRepository {
    pub async fn all(&self) -> Vec<CallRecord> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|left, right| left.dedupe_key.cmp(&right.dedupe_key));
        all
    }
}

#[async_trait::async_trait]
impl CallRecordRepository for InMemoryCallRecordRepository {
    async fn find_existing_keys(
        &self,
        keys: &[DedupeKey],
    ) -> Result<HashSet<DedupeKey>, RepositoryError> {
        let records = self.records.read().await;
        Ok(keys.iter().filter(|key| records.contains_key(*key)).cloned().collect())
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> Result<BatchWriteSummary, RepositoryError> {
        let mut records = self.records.write().await;
        let mut summary = BatchWriteSummary::default();

        for op in ops {
            match op {
                WriteOp::Insert(record) => {
                    // Same conflict rule as the SQL upsert: downstream columns survive.
                    let record = match records.get(&record.dedupe_key) {
                        Some(existing) => CallRecord {
                            audio_filename: existing.audio_filename.clone(),
                            transcription_filename: existing.transcription_filename.clone(),
                            transcription_status: existing.transcription_status,
                            ..record
                        },
                        None => record,
                    };
                    records.insert(record.dedupe_key.clone(), record);
                    summary.inserted += 1;
                }
                WriteOp::Replace(record) => match records.get_mut(&record.dedupe_key) {
                    Some(existing) => {
                        let CallRecord {
                            audio_filename,
                            transcription_filename,
                            transcription_status,
                            ..
                        } = existing.clone();
                        *existing = CallRecord {
                            audio_filename,
                            transcription_filename,
                            transcription_status,
                            ..record
                        };
                        summary.replaced += 1;
                    }
                    None => summary
                        .failures
                        .push((record.dedupe_key, "record no longer exists".to_string())),
                },
            }
        }

        Ok(summary)
    }

    async fn find_by_key(&self, key: &DedupeKey) -> Result<Option<CallRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn list_for_day(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
        status: Option<TranscriptionStatus>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<_> = records
            .values()
            .filter(|record| record.tenant_id == *tenant_id && record.filtering_date == day)
            .filter(|record| status.map_or(true, |wanted| record.transcription_status == wanted))
            .cloned()
            .collect();
        matching.sort_by(|left, right| {
            (left.occurred_at, &left.dedupe_key).cmp(&(right.occurred_at, &right.dedupe_key))
        });
        Ok(matching)
    }

    async fn update_transcription_status(
        &self,
        key: &DedupeKey,
        status: TranscriptionStatus,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(key).map(|record| record.transcription_status = status).is_some())
    }

    async fn set_audio_filename(
        &self,
        key: &DedupeKey,
        filename: &str,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(key)
            .map(|record| record.audio_filename = Some(filename.to_string()))
            .is_some())
    }

    async fn count_for_tenant(&self, tenant_id: &TenantId) -> Result<u64, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.values().filter(|record| record.tenant_id == *tenant_id).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemorySyncRunRepository {
    runs: RwLock<HashMap<(String, NaiveDate), SyncRun>>,
}

#[async_trait::async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
    async fn exists(&self, tenant_id: &TenantId, day: NaiveDate) -> Result<bool, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.contains_key(&(tenant_id.0.clone(), day)))
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
    ) -> Result<Option<SyncRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&(tenant_id.0.clone(), day)).cloned())
    }

    async fn mark_completed(&self, run: SyncRun) -> Result<bool, RepositoryError> {
        let mut runs = self.runs.write().await;
        let key = (run.tenant_id.0.clone(), run.day);
        if runs.contains_key(&key) {
            return Ok(false);
        }
        runs.insert(key, run);
        Ok(true)
    }
}
