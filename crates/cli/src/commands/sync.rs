use std::sync::Arc;
use std::time::Duration;

use callsync_core::config::AppConfig;
use callsync_core::dates::parse_day;
use callsync_core::domain::call_record::TenantId;
use callsync_core::domain::sync_run::DayStatus;
use callsync_core::errors::ApplicationError;
use callsync_core::normalize::Normalizer;
use callsync_db::repositories::{SqlCallRecordRepository, SqlSyncRunRepository};
use callsync_db::DbPool;
use callsync_sync::{
    ConfigCredentialProvider, HttpCrmConnector, SyncContext, SyncError, SyncOptions,
    TenantOutcome, TenantSyncError,
};

use crate::commands::{build_runtime, load_config, open_store, to_report, CommandResult};

const DAY_FAILED_EXIT_CODE: u8 = 6;

pub fn run_day(tenant: &str, date: &str, force: bool) -> CommandResult {
    const COMMAND: &str = "sync-day";

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let day = match parse_day(date) {
        Ok(day) => day,
        Err(error) => return CommandResult::from_error(COMMAND, &error.into()),
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let context = sync_context(&config, &pool, force);
        let coordinator =
            context.coordinator(&TenantId(tenant.to_string())).await.map_err(tenant_failure)?;
        let report = coordinator.sync_day(day).await;
        pool.close().await;
        Ok::<_, ApplicationError>(report)
    });

    match result {
        Ok(report) if report.status == DayStatus::FailedDayProcessing => {
            CommandResult::failure_with_report(
                COMMAND,
                "day_failed",
                format!("day {day} could not be processed; it will be retried on the next run"),
                DAY_FAILED_EXIT_CODE,
                to_report(&report),
            )
        }
        Ok(report) => CommandResult::success_with_report(
            COMMAND,
            format!("day {day}: {}", report.status.as_str()),
            to_report(&report),
        ),
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

/// `tenant == None` runs every configured tenant.
pub fn run_range(tenant: Option<&str>, start: &str, end: &str, force: bool) -> CommandResult {
    const COMMAND: &str = "sync-range";

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let (start, end) = match (parse_day(start), parse_day(end)) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(error), _) | (_, Err(error)) => {
            return CommandResult::from_error(COMMAND, &error.into())
        }
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let context = sync_context(&config, &pool, force);

        let outcome = match tenant {
            Some(tenant) => {
                let report = context
                    .sync_tenant_range(&TenantId(tenant.to_string()), start, end)
                    .await
                    .map_err(tenant_failure)?;
                let failed_days = report.totals.days_failed;
                (to_report(&report), failed_days, 0)
            }
            None => {
                let tenants = ConfigCredentialProvider::new(config.tenants.clone()).tenant_ids();
                let reports = context
                    .sync_all_tenants(&tenants, start, end)
                    .await
                    .map_err(|error| tenant_failure(TenantSyncError::Sync(error)))?;
                let mut failed_days = 0;
                let mut failed_tenants = 0;
                for report in &reports {
                    match &report.outcome {
                        TenantOutcome::Synced { report } => failed_days += report.totals.days_failed,
                        TenantOutcome::Failed { .. } => failed_tenants += 1,
                    }
                }
                (to_report(&reports), failed_days, failed_tenants)
            }
        };

        pool.close().await;
        Ok::<_, ApplicationError>(outcome)
    });

    match result {
        Ok((report, 0, 0)) => {
            CommandResult::success_with_report(COMMAND, format!("synced {start}..={end}"), report)
        }
        Ok((report, failed_days, failed_tenants)) => CommandResult::failure_with_report(
            COMMAND,
            "day_failed",
            format!(
                "{failed_days} day(s) and {failed_tenants} tenant(s) failed in {start}..={end}; failed days are retried on the next run"
            ),
            DAY_FAILED_EXIT_CODE,
            report,
        ),
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

fn sync_context(config: &AppConfig, pool: &DbPool, force: bool) -> SyncContext {
    SyncContext {
        records: Arc::new(SqlCallRecordRepository::new(pool.clone())),
        markers: Arc::new(SqlSyncRunRepository::new(pool.clone())),
        normalizer: Arc::new(Normalizer::new(config.audio.skip_hosts.clone())),
        credentials: Arc::new(ConfigCredentialProvider::new(config.tenants.clone())),
        connector: Arc::new(HttpCrmConnector::new(config.crm.clone())),
        page_size: config.crm.page_size,
        options: SyncOptions {
            concurrency: config.sync.concurrency as usize,
            lead_timeout: Duration::from_secs(config.sync.lead_timeout_secs),
            force,
        },
    }
}

fn tenant_failure(error: TenantSyncError) -> ApplicationError {
    match error {
        TenantSyncError::Credentials(error) => ApplicationError::Credentials(error.to_string()),
        TenantSyncError::Client(error) => ApplicationError::Integration(error.to_string()),
        TenantSyncError::Sync(SyncError::InvalidInput(error)) => ApplicationError::Domain(error),
    }
}
