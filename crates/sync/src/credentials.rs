use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use callsync_core::config::TenantConfig;
use callsync_core::domain::call_record::TenantId;

#[derive(Clone, Debug)]
pub struct TenantCredentials {
    pub tenant_id: TenantId,
    pub base_url: String,
    pub access_token: SecretString,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("tenant `{0}` is not configured")]
    UnknownTenant(String),
    #[error("tenant `{0}` has an empty access token")]
    MissingToken(String),
}

/// Resolves tenant-scoped CRM credentials. Token issuance and refresh happen
/// elsewhere; this only hands out what is currently valid.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, tenant_id: &TenantId) -> Result<TenantCredentials, CredentialError>;
}

/// Reads long-lived tokens straight from the loaded configuration.
pub struct ConfigCredentialProvider {
    tenants: Vec<TenantConfig>,
}

impl ConfigCredentialProvider {
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        Self { tenants }
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.tenants.iter().map(|tenant| TenantId(tenant.id.clone())).collect()
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentialProvider {
    async fn resolve(&self, tenant_id: &TenantId) -> Result<TenantCredentials, CredentialError> {
        let tenant = self
            .tenants
            .iter()
            .find(|tenant| tenant.id == tenant_id.0)
            .ok_or_else(|| CredentialError::UnknownTenant(tenant_id.0.clone()))?;

        if tenant.access_token.expose_secret().trim().is_empty() {
            return Err(CredentialError::MissingToken(tenant_id.0.clone()));
        }

        Ok(TenantCredentials {
            tenant_id: tenant_id.clone(),
            base_url: tenant.api_base_url(),
            access_token: tenant.access_token.clone(),
        })
    }
}
