//! Worker Pool: fan-out over one day's leads under an adaptive permit count,
//! with a per-lead timeout and isolate-and-count error handling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use callsync_core::concurrency::adaptive_concurrency;
use callsync_core::domain::call_record::TenantId;
use callsync_core::domain::lead::{LeadContext, RawLead};
use callsync_core::errors::DomainError;
use callsync_core::normalize::Normalizer;
use callsync_db::repositories::RepositoryError;

use crate::crm::{CrmClient, CrmError};
use crate::persist::BulkPersister;
use crate::stats::DayStats;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error(transparent)]
    Crm(#[from] CrmError),
    #[error(transparent)]
    Decode(#[from] DomainError),
    #[error("persisting calls failed: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("lead timed out after {0:?}")]
    Timeout(Duration),
    #[error("lead worker stopped unexpectedly: {0}")]
    Aborted(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeadOutcome {
    pub lead_id: i64,
    pub had_calls: bool,
    pub calls_saved: u32,
    pub calls_updated: u32,
    /// Records the store rejected individually.
    pub write_failures: u32,
}

/// The strictly sequential per-lead chain: detail, contact, call links,
/// normalize, persist.
#[derive(Clone)]
pub struct LeadPipeline {
    tenant_id: TenantId,
    crm: Arc<dyn CrmClient>,
    normalizer: Arc<Normalizer>,
    persister: BulkPersister,
}

impl LeadPipeline {
    pub fn new(
        tenant_id: TenantId,
        crm: Arc<dyn CrmClient>,
        normalizer: Arc<Normalizer>,
        persister: BulkPersister,
    ) -> Self {
        Self { tenant_id, crm, normalizer, persister }
    }

    pub async fn process(&self, listed: RawLead, day: NaiveDate) -> Result<LeadOutcome, LeadError> {
        let lead_id = listed.id.ok_or_else(|| {
            DomainError::InvariantViolation("listed lead has no `id`".to_string())
        })?;

        let lead = self.crm.get_lead(lead_id).await?;
        let contact = self.crm.get_lead_contact(lead_id).await?;
        let call_links = match contact.as_ref().and_then(|contact| contact.id) {
            Some(contact_id) => self.crm.get_call_links(contact_id).await?,
            None => Vec::new(),
        };

        let context = LeadContext::decode(lead, contact, call_links)?;
        let normalized = self.normalizer.normalize(&self.tenant_id, day, context, Utc::now());
        let summary = self.persister.persist(normalized.records).await?;

        Ok(LeadOutcome {
            lead_id,
            had_calls: normalized.had_calls,
            calls_saved: summary.inserted as u32,
            calls_updated: summary.replaced as u32,
            write_failures: summary.failures.len() as u32,
        })
    }
}

pub struct WorkerPool {
    pipeline: LeadPipeline,
    requested_concurrency: usize,
    lead_timeout: Duration,
}

impl WorkerPool {
    pub fn new(pipeline: LeadPipeline, requested_concurrency: usize, lead_timeout: Duration) -> Self {
        Self { pipeline, requested_concurrency, lead_timeout }
    }

    /// Processes every lead and returns once all of them have finished. A lead
    /// that fails or times out is logged and counted; its siblings carry on.
    pub async fn run(&self, day: NaiveDate, leads: Vec<RawLead>) -> DayStats {
        let started = Instant::now();
        let lead_count = leads.len();
        let mut stats = DayStats { leads_processed: lead_count as u32, ..DayStats::default() };
        if leads.is_empty() {
            return stats;
        }

        let permits = adaptive_concurrency(self.requested_concurrency, lead_count);
        info!(
            event_name = "sync.day.dispatch",
            day = %day,
            lead_count,
            permits,
            requested = self.requested_concurrency,
            "dispatching lead workers"
        );

        let semaphore = Arc::new(Semaphore::new(permits));
        let mut workers = JoinSet::new();
        for lead in leads {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = self.pipeline.clone();
            let lead_timeout = self.lead_timeout;
            let lead_id = lead.id;

            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| LeadError::Aborted("worker pool closed".to_string()))?;
                let result = match tokio::time::timeout(lead_timeout, pipeline.process(lead, day)).await {
                    Ok(result) => result,
                    Err(_) => Err(LeadError::Timeout(lead_timeout)),
                };
                if let Err(failure) = &result {
                    warn!(lead_id = ?lead_id, day = %day, error = %failure, "lead processing failed");
                }
                result
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    debug!(
                        lead_id = outcome.lead_id,
                        calls_saved = outcome.calls_saved,
                        calls_updated = outcome.calls_updated,
                        "lead processed"
                    );
                    stats.calls_saved += outcome.calls_saved;
                    stats.calls_updated += outcome.calls_updated;
                    if outcome.had_calls {
                        stats.leads_with_calls += 1;
                    }
                    if outcome.write_failures > 0 {
                        stats.errors += 1;
                    } else {
                        stats.leads_succeeded += 1;
                    }
                }
                Ok(Err(_)) => stats.errors += 1,
                Err(join_error) => {
                    error!(day = %day, error = %join_error, "lead worker panicked");
                    stats.errors += 1;
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        stats
    }
}
