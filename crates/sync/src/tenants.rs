//! Wiring: turns shared handles plus a tenant's credentials into a ready
//! [`SyncCoordinator`], and drives ranges across every configured tenant.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info};

use callsync_core::config::CrmConfig;
use callsync_core::domain::call_record::TenantId;
use callsync_core::normalize::Normalizer;
use callsync_db::repositories::{CallRecordRepository, SyncRunRepository};

use crate::coordinator::{RangeReport, SyncCoordinator, SyncError, SyncOptions};
use crate::credentials::{CredentialError, CredentialProvider, TenantCredentials};
use crate::crm::{CrmClient, CrmError, HttpCrmClient};
use crate::fetcher::LeadFetcher;
use crate::persist::BulkPersister;
use crate::worker::{LeadPipeline, WorkerPool};

/// Builds a CRM client for resolved credentials.
pub trait CrmConnector: Send + Sync {
    fn connect(&self, credentials: &TenantCredentials) -> Result<Arc<dyn CrmClient>, CrmError>;
}

pub struct HttpCrmConnector {
    settings: CrmConfig,
}

impl HttpCrmConnector {
    pub fn new(settings: CrmConfig) -> Self {
        Self { settings }
    }
}

impl CrmConnector for HttpCrmConnector {
    fn connect(&self, credentials: &TenantCredentials) -> Result<Arc<dyn CrmClient>, CrmError> {
        let client = HttpCrmClient::new(
            credentials.base_url.clone(),
            credentials.access_token.clone(),
            &self.settings,
        )?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TenantSyncError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("could not build crm client: {0}")]
    Client(#[from] CrmError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TenantOutcome {
    Synced { report: RangeReport },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenantSyncReport {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub outcome: TenantOutcome,
}

/// Handles shared by every tenant's sync, constructed once per process.
pub struct SyncContext {
    pub records: Arc<dyn CallRecordRepository>,
    pub markers: Arc<dyn SyncRunRepository>,
    pub normalizer: Arc<Normalizer>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn CrmConnector>,
    pub page_size: u32,
    pub options: SyncOptions,
}

impl SyncContext {
    pub fn coordinator_for(&self, tenant_id: TenantId, crm: Arc<dyn CrmClient>) -> SyncCoordinator {
        let pipeline = LeadPipeline::new(
            tenant_id.clone(),
            Arc::clone(&crm),
            Arc::clone(&self.normalizer),
            BulkPersister::new(Arc::clone(&self.records)),
        );
        SyncCoordinator::new(
            tenant_id,
            LeadFetcher::new(crm, self.page_size),
            WorkerPool::new(pipeline, self.options.concurrency, self.options.lead_timeout),
            Arc::clone(&self.markers),
            self.options.force,
        )
    }

    /// Credential and client failures are caller-facing for a single tenant.
    pub async fn coordinator(&self, tenant_id: &TenantId) -> Result<SyncCoordinator, TenantSyncError> {
        let credentials = self.credentials.resolve(tenant_id).await?;
        let crm = self.connector.connect(&credentials)?;
        Ok(self.coordinator_for(tenant_id.clone(), crm))
    }

    pub async fn sync_tenant_range(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeReport, TenantSyncError> {
        let coordinator = self.coordinator(tenant_id).await?;
        Ok(coordinator.sync_range(start, end).await?)
    }

    /// Runs the range for each tenant in turn. A tenant whose credentials or
    /// client cannot be set up is reported as failed and the rest continue.
    /// An inverted range fails the whole call before any tenant is touched.
    pub async fn sync_all_tenants(
        &self,
        tenants: &[TenantId],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TenantSyncReport>, SyncError> {
        callsync_core::dates::days_in_range(start, end)?;

        let mut reports = Vec::with_capacity(tenants.len());
        for tenant_id in tenants {
            let outcome = match self.sync_tenant_range(tenant_id, start, end).await {
                Ok(report) => TenantOutcome::Synced { report },
                Err(TenantSyncError::Sync(failure)) => return Err(failure),
                Err(failure) => {
                    error!(
                        event_name = "sync.tenant.setup_failed",
                        tenant_id = %tenant_id,
                        error = %failure,
                        "skipping tenant"
                    );
                    TenantOutcome::Failed { reason: failure.to_string() }
                }
            };
            reports.push(TenantSyncReport { tenant_id: tenant_id.clone(), outcome });
        }

        info!(event_name = "sync.tenants.finished", tenants = reports.len(), "all tenants processed");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use callsync_core::chrono::NaiveDate;
    use callsync_core::config::TenantConfig;
    use callsync_core::domain::call_record::TenantId;
    use callsync_core::normalize::Normalizer;
    use callsync_db::repositories::{InMemoryCallRecordRepository, InMemorySyncRunRepository};
    use secrecy::SecretString;

    use super::{CrmConnector, SyncContext, TenantOutcome};
    use crate::coordinator::SyncOptions;
    use crate::credentials::{ConfigCredentialProvider, TenantCredentials};
    use crate::crm::{CrmClient, CrmError};
    use crate::worker::tests::FakeCrm;

    struct FakeConnector;

    impl CrmConnector for FakeConnector {
        fn connect(&self, _credentials: &TenantCredentials) -> Result<Arc<dyn CrmClient>, CrmError> {
            Ok(Arc::new(FakeCrm { leads: vec![1], calls_per_lead: 1, ..FakeCrm::default() }))
        }
    }

    fn context(tenants: Vec<TenantConfig>) -> SyncContext {
        SyncContext {
            records: Arc::new(InMemoryCallRecordRepository::default()),
            markers: Arc::new(InMemorySyncRunRepository::default()),
            normalizer: Arc::new(Normalizer::new(Vec::new())),
            credentials: Arc::new(ConfigCredentialProvider::new(tenants)),
            connector: Arc::new(FakeConnector),
            page_size: 50,
            options: SyncOptions { concurrency: 2, lead_timeout: Duration::from_secs(30), force: false },
        }
    }

    fn tenant(id: &str) -> TenantConfig {
        TenantConfig {
            id: id.to_string(),
            subdomain: id.to_string(),
            base_url: None,
            access_token: SecretString::from("token".to_string()),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).expect("date")
    }

    #[tokio::test]
    async fn unknown_tenant_fails_alone() {
        let context = context(vec![tenant("clinic-1")]);
        let tenants = [TenantId("ghost".into()), TenantId("clinic-1".into())];

        let reports = context.sync_all_tenants(&tenants, day(5), day(6)).await.expect("reports");

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].outcome, TenantOutcome::Failed { .. }));
        match &reports[1].outcome {
            TenantOutcome::Synced { report } => assert_eq!(report.days.len(), 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn inverted_range_fails_before_any_tenant() {
        let context = context(vec![tenant("clinic-1")]);
        let result =
            context.sync_all_tenants(&[TenantId("clinic-1".into())], day(6), day(5)).await;
        assert!(result.is_err());
    }
}
