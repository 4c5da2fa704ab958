use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use callsync_core::domain::call_record::{CallRecord, DedupeKey, TenantId, TranscriptionStatus};
use callsync_core::domain::sync_run::SyncRun;

pub mod call_record;
pub mod memory;
pub mod sync_run;

pub use call_record::SqlCallRecordRepository;
pub use memory::{InMemoryCallRecordRepository, InMemorySyncRunRepository};
pub use sync_run::SqlSyncRunRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One entry of a batched write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// New key. Races with a concurrent insert of the same key resolve last-write-wins.
    Insert(CallRecord),
    /// Known key. Rewrites CRM-derived fields and keeps transcription state and filenames.
    Replace(CallRecord),
}

impl WriteOp {
    pub fn record(&self) -> &CallRecord {
        match self {
            Self::Insert(record) | Self::Replace(record) => record,
        }
    }
}

/// Per-item result of a batch. A failed item never blocks the others.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchWriteSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub failures: Vec<(DedupeKey, String)>,
}

impl BatchWriteSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    /// Subset of `keys` already present in the store.
    async fn find_existing_keys(
        &self,
        keys: &[DedupeKey],
    ) -> Result<HashSet<DedupeKey>, RepositoryError>;

    /// Applies every operation independently. `Err` means the batch could not be
    /// submitted at all; item failures are reported in the summary.
    async fn bulk_write(&self, ops: Vec<WriteOp>) -> Result<BatchWriteSummary, RepositoryError>;

    async fn find_by_key(&self, key: &DedupeKey) -> Result<Option<CallRecord>, RepositoryError>;

    async fn list_for_day(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
        status: Option<TranscriptionStatus>,
    ) -> Result<Vec<CallRecord>, RepositoryError>;

    /// Returns `false` when no record has this key.
    async fn update_transcription_status(
        &self,
        key: &DedupeKey,
        status: TranscriptionStatus,
    ) -> Result<bool, RepositoryError>;

    async fn set_audio_filename(
        &self,
        key: &DedupeKey,
        filename: &str,
    ) -> Result<bool, RepositoryError>;

    async fn count_for_tenant(&self, tenant_id: &TenantId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    async fn exists(&self, tenant_id: &TenantId, day: NaiveDate) -> Result<bool, RepositoryError>;

    async fn find(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
    ) -> Result<Option<SyncRun>, RepositoryError>;

    /// Writes the marker once. Returns `false` if one already existed, which is
    /// left untouched.
    async fn mark_completed(&self, run: SyncRun) -> Result<bool, RepositoryError>;
}
