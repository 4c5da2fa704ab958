pub mod audio;
pub mod coordinator;
pub mod credentials;
pub mod crm;
pub mod fetcher;
pub mod persist;
pub mod stats;
pub mod tenants;
pub mod worker;

pub use audio::{AudioError, AudioRetriever, ProxyEndpoint};
pub use coordinator::{DayReport, RangeReport, SyncCoordinator, SyncError, SyncOptions};
pub use credentials::{ConfigCredentialProvider, CredentialError, CredentialProvider, TenantCredentials};
pub use crm::{CrmClient, CrmError, HttpCrmClient, LeadPage};
pub use fetcher::LeadFetcher;
pub use persist::BulkPersister;
pub use stats::{DayStats, RangeTotals};
pub use tenants::{CrmConnector, HttpCrmConnector, SyncContext, TenantOutcome, TenantSyncError, TenantSyncReport};
pub use worker::{LeadError, LeadOutcome, LeadPipeline, WorkerPool};
