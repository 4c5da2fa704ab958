//! Sync Coordinator: walks a date range one day at a time behind the
//! per-(tenant, day) marker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use callsync_core::dates::{days_in_range, DayWindow};
use callsync_core::domain::call_record::TenantId;
use callsync_core::domain::sync_run::{DayStatus, SyncRun};
use callsync_core::errors::DomainError;
use callsync_db::repositories::SyncRunRepository;

use crate::fetcher::LeadFetcher;
use crate::stats::{DayStats, RangeTotals};
use crate::worker::WorkerPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    pub concurrency: usize,
    pub lead_timeout: Duration,
    /// Process days even when their marker exists. The marker is not rewritten.
    pub force: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { concurrency: 5, lead_timeout: Duration::from_secs(90), force: false }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayReport {
    pub day: NaiveDate,
    pub status: DayStatus,
    #[serde(flatten)]
    pub stats: DayStats,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    pub tenant_id: TenantId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<DayReport>,
    pub totals: RangeTotals,
}

pub struct SyncCoordinator {
    tenant_id: TenantId,
    fetcher: LeadFetcher,
    workers: WorkerPool,
    markers: Arc<dyn SyncRunRepository>,
    force: bool,
}

impl SyncCoordinator {
    pub fn new(
        tenant_id: TenantId,
        fetcher: LeadFetcher,
        workers: WorkerPool,
        markers: Arc<dyn SyncRunRepository>,
        force: bool,
    ) -> Self {
        Self { tenant_id, fetcher, workers, markers, force }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Syncs one day. Never fails: every outcome is a status in the report.
    pub async fn sync_day(&self, day: NaiveDate) -> DayReport {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        if !self.force {
            match self.markers.exists(&self.tenant_id, day).await {
                Ok(true) => {
                    info!(
                        event_name = "sync.day.skipped",
                        correlation_id = %correlation_id,
                        tenant_id = %self.tenant_id,
                        day = %day,
                        "day already synced"
                    );
                    return DayReport { day, status: DayStatus::Skipped, stats: DayStats::default() };
                }
                Ok(false) => {}
                Err(failure) => {
                    error!(
                        event_name = "sync.day.marker_lookup_failed",
                        correlation_id = %correlation_id,
                        tenant_id = %self.tenant_id,
                        day = %day,
                        error = %failure,
                        "could not check day marker"
                    );
                    return failed_day(day, started);
                }
            }
        }

        info!(
            event_name = "sync.day.start",
            correlation_id = %correlation_id,
            tenant_id = %self.tenant_id,
            day = %day,
            force = self.force,
            "fetching leads"
        );

        let leads = match self.fetcher.fetch_all(DayWindow::for_day(day)).await {
            Ok(leads) => leads,
            Err(failure) => {
                error!(
                    event_name = "sync.day.fetch_failed",
                    correlation_id = %correlation_id,
                    tenant_id = %self.tenant_id,
                    day = %day,
                    error = %failure,
                    "lead listing failed; day left unmarked"
                );
                return failed_day(day, started);
            }
        };

        let mut stats = self.workers.run(day, leads).await;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        let status = day_status(&stats);

        if status.writes_marker() {
            let run = SyncRun {
                tenant_id: self.tenant_id.clone(),
                day,
                status,
                leads_processed: stats.leads_processed,
                calls_saved: stats.calls_saved,
                errors: stats.errors,
                completed_at: Utc::now(),
            };
            match self.markers.mark_completed(run).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    correlation_id = %correlation_id,
                    tenant_id = %self.tenant_id,
                    day = %day,
                    "marker already present, left unchanged"
                ),
                Err(failure) => error!(
                    event_name = "sync.day.marker_write_failed",
                    correlation_id = %correlation_id,
                    tenant_id = %self.tenant_id,
                    day = %day,
                    error = %failure,
                    "could not write day marker; the day will be processed again"
                ),
            }
        }

        info!(
            event_name = "sync.day.finished",
            correlation_id = %correlation_id,
            tenant_id = %self.tenant_id,
            day = %day,
            status = status.as_str(),
            leads_processed = stats.leads_processed,
            leads_with_calls = stats.leads_with_calls,
            calls_saved = stats.calls_saved,
            calls_updated = stats.calls_updated,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "day finished"
        );

        DayReport { day, status, stats }
    }

    /// Days are processed strictly in order. Only an inverted range is an error.
    pub async fn sync_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeReport, SyncError> {
        let days = days_in_range(start, end)?;
        let mut report = RangeReport {
            tenant_id: self.tenant_id.clone(),
            start,
            end,
            days: Vec::with_capacity(days.len()),
            totals: RangeTotals::default(),
        };

        for day in days {
            let day_report = self.sync_day(day).await;
            report.totals.record_day(day_report.status, &day_report.stats);
            report.days.push(day_report);
        }

        info!(
            event_name = "sync.range.finished",
            tenant_id = %self.tenant_id,
            start = %start,
            end = %end,
            days = report.days.len(),
            calls_saved = report.totals.stats.calls_saved,
            errors = report.totals.stats.errors,
            "range finished"
        );
        Ok(report)
    }
}

fn day_status(stats: &DayStats) -> DayStatus {
    if stats.errors > 0 {
        DayStatus::CompletedWithErrors
    } else if stats.leads_with_calls == 0 {
        DayStatus::CompletedNoLeads
    } else {
        DayStatus::Completed
    }
}

fn failed_day(day: NaiveDate, started: Instant) -> DayReport {
    DayReport {
        day,
        status: DayStatus::FailedDayProcessing,
        stats: DayStats {
            errors: 1,
            duration_ms: started.elapsed().as_millis() as u64,
            ..DayStats::default()
        },
    }
}
