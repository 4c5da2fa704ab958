use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row};

use callsync_core::domain::call_record::TenantId;
use callsync_core::domain::sync_run::{DayStatus, SyncRun};

use super::call_record::{parse_day, parse_timestamp, parse_u32};
use super::{RepositoryError, SyncRunRepository};
use crate::DbPool;

pub struct SqlSyncRunRepository {
    pool: DbPool,
}

impl SqlSyncRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SyncRunRepository for SqlSyncRunRepository {
    async fn exists(&self, tenant_id: &TenantId, day: NaiveDate) -> Result<bool, RepositoryError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sync_run WHERE tenant_id = ? AND day = ?")
                .bind(&tenant_id.0)
                .bind(day.format("%Y-%m-%d").to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
    ) -> Result<Option<SyncRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, day, status, leads_processed, calls_saved, errors, completed_at
             FROM sync_run
             WHERE tenant_id = ? AND day = ?",
        )
        .bind(&tenant_id.0)
        .bind(day.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(run_from_row).transpose()
    }

    async fn mark_completed(&self, run: SyncRun) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO sync_run (
                tenant_id,
                day,
                status,
                leads_processed,
                calls_saved,
                errors,
                completed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, day) DO NOTHING",
        )
        .bind(&run.tenant_id.0)
        .bind(run.day.format("%Y-%m-%d").to_string())
        .bind(run.status.as_str())
        .bind(i64::from(run.leads_processed))
        .bind(i64::from(run.calls_saved))
        .bind(i64::from(run.errors))
        .bind(run.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn run_from_row(row: SqliteRow) -> Result<SyncRun, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DayStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown day status `{status_raw}`")))?;

    Ok(SyncRun {
        tenant_id: TenantId(row.try_get("tenant_id")?),
        day: parse_day("day", row.try_get("day")?)?,
        status,
        leads_processed: parse_u32("leads_processed", row.try_get("leads_processed")?)?,
        calls_saved: parse_u32("calls_saved", row.try_get("calls_saved")?)?,
        errors: parse_u32("errors", row.try_get("errors")?)?,
        completed_at: parse_timestamp("completed_at", row.try_get("completed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use callsync_core::domain::call_record::TenantId;
    use callsync_core::domain::sync_run::{DayStatus, SyncRun};

    use super::SqlSyncRunRepository;
    use crate::migrations;
    use crate::repositories::SyncRunRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_run(status: DayStatus, calls_saved: u32) -> SyncRun {
        SyncRun {
            tenant_id: TenantId("clinic-1".to_string()),
            day: NaiveDate::from_ymd_opt(2025, 4, 5).expect("date"),
            status,
            leads_processed: 3,
            calls_saved,
            errors: 0,
            completed_at: DateTime::parse_from_rfc3339("2025-04-06T01:00:00Z")
                .expect("ts")
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn marker_is_written_once_and_never_updated() {
        let pool = setup_pool().await;
        let repo = SqlSyncRunRepository::new(pool.clone());
        let first = sample_run(DayStatus::CompletedNoLeads, 0);

        assert!(!repo.exists(&first.tenant_id, first.day).await.expect("exists"));
        assert!(repo.mark_completed(first.clone()).await.expect("mark"));
        assert!(repo.exists(&first.tenant_id, first.day).await.expect("exists"));

        let second = sample_run(DayStatus::Completed, 12);
        assert!(!repo.mark_completed(second).await.expect("second mark"));

        let stored = repo.find(&first.tenant_id, first.day).await.expect("find");
        assert_eq!(stored, Some(first));

        pool.close().await;
    }

    #[tokio::test]
    async fn markers_are_scoped_per_tenant() {
        let pool = setup_pool().await;
        let repo = SqlSyncRunRepository::new(pool.clone());
        let run = sample_run(DayStatus::Completed, 4);
        repo.mark_completed(run.clone()).await.expect("mark");

        assert!(!repo
            .exists(&TenantId("clinic-2".to_string()), run.day)
            .await
            .expect("other tenant"));

        pool.close().await;
    }
}
