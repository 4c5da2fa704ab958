//! Bulk Persistence Layer: two round-trips per lead, one existence check and
//! one batched write.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use callsync_core::domain::call_record::{CallRecord, DedupeKey};
use callsync_db::repositories::{
    BatchWriteSummary, CallRecordRepository, RepositoryError, WriteOp,
};

#[derive(Clone)]
pub struct BulkPersister {
    records: Arc<dyn CallRecordRepository>,
}

impl BulkPersister {
    pub fn new(records: Arc<dyn CallRecordRepository>) -> Self {
        Self { records }
    }

    /// Known keys become replaces, new keys become inserts. A key repeated in
    /// `batch` is written once, with its last occurrence.
    pub async fn persist(&self, batch: Vec<CallRecord>) -> Result<BatchWriteSummary, RepositoryError> {
        let batch = collapse_duplicate_keys(batch);
        if batch.is_empty() {
            return Ok(BatchWriteSummary::default());
        }

        let keys: Vec<DedupeKey> = batch.iter().map(|record| record.dedupe_key.clone()).collect();
        let existing = self.records.find_existing_keys(&keys).await?;

        let ops = batch
            .into_iter()
            .map(|record| {
                if existing.contains(&record.dedupe_key) {
                    WriteOp::Replace(record)
                } else {
                    WriteOp::Insert(record)
                }
            })
            .collect();

        let summary = self.records.bulk_write(ops).await?;
        for (key, reason) in &summary.failures {
            warn!(dedupe_key = %key, reason = %reason, "call record write failed");
        }
        Ok(summary)
    }
}

fn collapse_duplicate_keys(batch: Vec<CallRecord>) -> Vec<CallRecord> {
    let mut positions: HashMap<DedupeKey, usize> = HashMap::new();
    let mut collapsed: Vec<CallRecord> = Vec::with_capacity(batch.len());

    for record in batch {
        match positions.get(&record.dedupe_key) {
            Some(&index) => collapsed[index] = record,
            None => {
                positions.insert(record.dedupe_key.clone(), collapsed.len());
                collapsed.push(record);
            }
        }
    }

    collapsed
}
