use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use callsync_core::domain::call_record::{
    CallDirection, CallRecord, DedupeKey, TenantId, TranscriptionStatus,
};

use super::{BatchWriteSummary, CallRecordRepository, RepositoryError, WriteOp};
use crate::DbPool;

// Stays well under SQLite's bound-parameter limit.
const EXISTENCE_CHUNK: usize = 500;

const SELECT_COLUMNS: &str = "SELECT
        dedupe_key,
        tenant_id,
        lead_id,
        lead_name,
        contact_id,
        contact_name,
        administrator_name,
        traffic_source,
        direction,
        duration_seconds,
        phone,
        audio_url,
        responsible_user_id,
        occurred_at,
        ingested_at,
        processing_speed_minutes,
        processing_speed_label,
        filtering_date,
        audio_filename,
        transcription_filename,
        transcription_status
     FROM call_record";

pub struct SqlCallRecordRepository {
    pool: DbPool,
}

impl SqlCallRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CallRecordRepository for SqlCallRecordRepository {
    async fn find_existing_keys(
        &self,
        keys: &[DedupeKey],
    ) -> Result<HashSet<DedupeKey>, RepositoryError> {
        let mut existing = HashSet::new();

        for chunk in keys.chunks(EXISTENCE_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT dedupe_key FROM call_record WHERE dedupe_key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.0.clone());
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in rows {
                existing.insert(DedupeKey(row.try_get("dedupe_key")?));
            }
        }

        Ok(existing)
    }

    async fn bulk_write(&self, ops: Vec<WriteOp>) -> Result<BatchWriteSummary, RepositoryError> {
        let mut summary = BatchWriteSummary::default();
        if ops.is_empty() {
            return Ok(summary);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        // A failed statement only rolls back itself; the transaction carries on.
        for op in ops {
            let key = op.record().dedupe_key.clone();
            match op {
                WriteOp::Insert(record) => {
                    match insert_record(&mut tx, &record, &now).await {
                        Ok(()) => summary.inserted += 1,
                        Err(error) => summary.failures.push((key, error.to_string())),
                    }
                }
                WriteOp::Replace(record) => match replace_record(&mut tx, &record, &now).await {
                    Ok(true) => summary.replaced += 1,
                    Ok(false) => {
                        summary.failures.push((key, "record no longer exists".to_string()))
                    }
                    Err(error) => summary.failures.push((key, error.to_string())),
                },
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn find_by_key(&self, key: &DedupeKey) -> Result<Option<CallRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE dedupe_key = ?"))
            .bind(&key.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn list_for_day(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
        status: Option<TranscriptionStatus>,
    ) -> Result<Vec<CallRecord>, RepositoryError> {
        let day = day.format("%Y-%m-%d").to_string();
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "{SELECT_COLUMNS}
                 WHERE tenant_id = ? AND filtering_date = ? AND transcription_status = ?
                 ORDER BY occurred_at ASC, dedupe_key ASC"
            ))
            .bind(&tenant_id.0)
            .bind(&day)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "{SELECT_COLUMNS}
                 WHERE tenant_id = ? AND filtering_date = ?
                 ORDER BY occurred_at ASC, dedupe_key ASC"
            ))
            .bind(&tenant_id.0)
            .bind(&day)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(record_from_row).collect()
    }

    async fn update_transcription_status(
        &self,
        key: &DedupeKey,
        status: TranscriptionStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE call_record SET transcription_status = ?, updated_at = ? WHERE dedupe_key = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&key.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_audio_filename(
        &self,
        key: &DedupeKey,
        filename: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE call_record SET audio_filename = ?, updated_at = ? WHERE dedupe_key = ?",
        )
        .bind(filename)
        .bind(Utc::now().to_rfc3339())
        .bind(&key.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_for_tenant(&self, tenant_id: &TenantId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM call_record WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .fetch_one(&self.pool)
            .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("negative record count {count}")))
    }
}

async fn insert_record(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &CallRecord,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO call_record (
            dedupe_key,
            tenant_id,
            lead_id,
            lead_name,
            contact_id,
            contact_name,
            administrator_name,
            traffic_source,
            direction,
            duration_seconds,
            duration_formatted,
            phone,
            audio_url,
            responsible_user_id,
            occurred_at,
            ingested_at,
            processing_speed_minutes,
            processing_speed_label,
            filtering_date,
            audio_filename,
            transcription_filename,
            transcription_status,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(dedupe_key) DO UPDATE SET
            tenant_id = excluded.tenant_id,
            lead_id = excluded.lead_id,
            lead_name = excluded.lead_name,
            contact_id = excluded.contact_id,
            contact_name = excluded.contact_name,
            administrator_name = excluded.administrator_name,
            traffic_source = excluded.traffic_source,
            direction = excluded.direction,
            duration_seconds = excluded.duration_seconds,
            duration_formatted = excluded.duration_formatted,
            phone = excluded.phone,
            audio_url = excluded.audio_url,
            responsible_user_id = excluded.responsible_user_id,
            occurred_at = excluded.occurred_at,
            ingested_at = excluded.ingested_at,
            processing_speed_minutes = excluded.processing_speed_minutes,
            processing_speed_label = excluded.processing_speed_label,
            filtering_date = excluded.filtering_date,
            updated_at = excluded.updated_at",
    )
    .bind(&record.dedupe_key.0)
    .bind(&record.tenant_id.0)
    .bind(record.lead_id)
    .bind(&record.lead_name)
    .bind(record.contact_id)
    .bind(&record.contact_name)
    .bind(&record.administrator_name)
    .bind(&record.traffic_source)
    .bind(record.direction.as_str())
    .bind(i64::from(record.duration_seconds))
    .bind(record.duration_formatted())
    .bind(&record.phone)
    .bind(&record.audio_url)
    .bind(record.responsible_user_id)
    .bind(record.occurred_at.to_rfc3339())
    .bind(record.ingested_at.to_rfc3339())
    .bind(i64::from(record.processing_speed_minutes))
    .bind(&record.processing_speed_label)
    .bind(record.filtering_date.format("%Y-%m-%d").to_string())
    .bind(record.audio_filename.as_deref())
    .bind(record.transcription_filename.as_deref())
    .bind(record.transcription_status.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn replace_record(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &CallRecord,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE call_record SET
            tenant_id = ?,
            lead_id = ?,
            lead_name = ?,
            contact_id = ?,
            contact_name = ?,
            administrator_name = ?,
            traffic_source = ?,
            direction = ?,
            duration_seconds = ?,
            duration_formatted = ?,
            phone = ?,
            audio_url = ?,
            responsible_user_id = ?,
            occurred_at = ?,
            ingested_at = ?,
            processing_speed_minutes = ?,
            processing_speed_label = ?,
            filtering_date = ?,
            updated_at = ?
         WHERE dedupe_key = ?",
    )
    .bind(&record.tenant_id.0)
    .bind(record.lead_id)
    .bind(&record.lead_name)
    .bind(record.contact_id)
    .bind(&record.contact_name)
    .bind(&record.administrator_name)
    .bind(&record.traffic_source)
    .bind(record.direction.as_str())
    .bind(i64::from(record.duration_seconds))
    .bind(record.duration_formatted())
    .bind(&record.phone)
    .bind(&record.audio_url)
    .bind(record.responsible_user_id)
    .bind(record.occurred_at.to_rfc3339())
    .bind(record.ingested_at.to_rfc3339())
    .bind(i64::from(record.processing_speed_minutes))
    .bind(&record.processing_speed_label)
    .bind(record.filtering_date.format("%Y-%m-%d").to_string())
    .bind(now)
    .bind(&record.dedupe_key.0)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn record_from_row(row: SqliteRow) -> Result<CallRecord, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = CallDirection::parse(&direction_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown direction `{direction_raw}`")))?;

    let status_raw = row.try_get::<String, _>("transcription_status")?;
    let transcription_status = TranscriptionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown transcription status `{status_raw}`"))
    })?;

    Ok(CallRecord {
        dedupe_key: DedupeKey(row.try_get("dedupe_key")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        lead_id: row.try_get("lead_id")?,
        lead_name: row.try_get("lead_name")?,
        contact_id: row.try_get("contact_id")?,
        contact_name: row.try_get("contact_name")?,
        administrator_name: row.try_get("administrator_name")?,
        traffic_source: row.try_get("traffic_source")?,
        direction,
        duration_seconds: parse_u32("duration_seconds", row.try_get("duration_seconds")?)?,
        phone: row.try_get("phone")?,
        audio_url: row.try_get("audio_url")?,
        responsible_user_id: row.try_get("responsible_user_id")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        ingested_at: parse_timestamp("ingested_at", row.try_get("ingested_at")?)?,
        processing_speed_minutes: parse_u32(
            "processing_speed_minutes",
            row.try_get("processing_speed_minutes")?,
        )?,
        processing_speed_label: row.try_get("processing_speed_label")?,
        filtering_date: parse_day("filtering_date", row.try_get("filtering_date")?)?,
        audio_filename: row.try_get("audio_filename")?,
        transcription_filename: row.try_get("transcription_filename")?,
        transcription_status,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_day(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}
