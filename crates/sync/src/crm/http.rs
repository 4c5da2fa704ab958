use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use callsync_core::config::CrmConfig;
use callsync_core::dates::DayWindow;
use callsync_core::domain::lead::{RawCallLink, RawContact, RawLead};

use super::{decode_call_links, decode_lead_page, first_linked_contact, CrmClient, CrmError, LeadPage};

const CALL_NOTE_TYPES: &[&str] = &["call_in", "call_out"];
const NOTES_PAGE_LIMIT: u32 = 100;

/// Bearer-token client for the CRM's v4 REST API, throttled to the
/// configured request rate.
pub struct HttpCrmClient {
    client: Client,
    base_url: String,
    access_token: SecretString,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpCrmClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: SecretString,
        settings: &CrmConfig,
    ) -> Result<Self, CrmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|error| CrmError::Setup(error.to_string()))?;
        let per_second = NonZeroU32::new(settings.requests_per_second)
            .ok_or_else(|| CrmError::Setup("requests_per_second must be greater than 0".into()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// `Ok(None)` on 204, which the CRM uses for "nothing here".
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, CrmError> {
        self.limiter.until_ready().await;

        let endpoint = format!("{}{}", self.base_url, path);
        debug!(endpoint = %endpoint, "crm request");
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|source| CrmError::Transport { endpoint: path.to_string(), source })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CrmError::Status { endpoint: path.to_string(), status: status.as_u16() });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|error| CrmError::Decode { endpoint: path.to_string(), message: error.to_string() })?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn list_leads(
        &self,
        window: &DayWindow,
        page: u32,
        limit: u32,
    ) -> Result<LeadPage, CrmError> {
        let query = [
            ("filter[created_at][from]", window.from.to_string()),
            ("filter[created_at][to]", window.to.to_string()),
            ("page", page.to_string()),
            ("limit", limit.to_string()),
        ];

        Ok(self
            .get_json("/api/v4/leads", &query)
            .await?
            .map_or(LeadPage::Empty, |body| decode_lead_page(&body)))
    }

    async fn get_lead(&self, lead_id: i64) -> Result<RawLead, CrmError> {
        let path = format!("/api/v4/leads/{lead_id}");
        let body = self
            .get_json(&path, &[])
            .await?
            .ok_or_else(|| CrmError::Decode { endpoint: path.clone(), message: "empty lead body".into() })?;

        serde_json::from_value(body)
            .map_err(|error| CrmError::Decode { endpoint: path, message: error.to_string() })
    }

    async fn get_lead_contact(&self, lead_id: i64) -> Result<Option<RawContact>, CrmError> {
        let links = self.get_json(&format!("/api/v4/leads/{lead_id}/links"), &[]).await?;
        let Some(contact_id) = links.as_ref().and_then(first_linked_contact) else {
            return Ok(None);
        };

        let path = format!("/api/v4/contacts/{contact_id}");
        match self.get_json(&path, &[]).await? {
            Some(body) => serde_json::from_value(body)
                .map(Some)
                .map_err(|error| CrmError::Decode { endpoint: path, message: error.to_string() }),
            None => Ok(None),
        }
    }

    async fn get_call_links(&self, contact_id: i64) -> Result<Vec<RawCallLink>, CrmError> {
        let mut query: Vec<(&str, String)> =
            CALL_NOTE_TYPES.iter().map(|kind| ("filter[note_type][]", kind.to_string())).collect();
        query.push(("limit", NOTES_PAGE_LIMIT.to_string()));

        let body = self.get_json(&format!("/api/v4/contacts/{contact_id}/notes"), &query).await?;
        Ok(body.as_ref().map(decode_call_links).unwrap_or_default())
    }
}
