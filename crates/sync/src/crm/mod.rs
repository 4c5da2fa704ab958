//! Read side of the CRM: the [`CrmClient`] seam and the lead-page envelope.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use callsync_core::dates::DayWindow;
use callsync_core::domain::lead::{RawCallLink, RawContact, RawLead};

pub use http::HttpCrmClient;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("request to `{endpoint}` failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{endpoint}` answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode `{endpoint}` response: {message}")]
    Decode { endpoint: String, message: String },
    #[error("crm client setup failed: {0}")]
    Setup(String),
}

/// One page of the lead listing.
#[derive(Clone, Debug, PartialEq)]
pub enum LeadPage {
    Leads { leads: Vec<RawLead>, has_next: bool },
    /// No results on this page (HTTP 204 or an empty list).
    Empty,
    /// The body lacked `_embedded.leads`.
    UnexpectedEnvelope,
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn list_leads(
        &self,
        window: &DayWindow,
        page: u32,
        limit: u32,
    ) -> Result<LeadPage, CrmError>;

    async fn get_lead(&self, lead_id: i64) -> Result<RawLead, CrmError>;

    /// First contact linked to the lead, if any.
    async fn get_lead_contact(&self, lead_id: i64) -> Result<Option<RawContact>, CrmError>;

    async fn get_call_links(&self, contact_id: i64) -> Result<Vec<RawCallLink>, CrmError>;
}

pub fn decode_lead_page(body: &Value) -> LeadPage {
    let Some(entries) = body.pointer("/_embedded/leads").and_then(Value::as_array) else {
        return LeadPage::UnexpectedEnvelope;
    };
    if entries.is_empty() {
        return LeadPage::Empty;
    }

    // An entry that cannot be read at all still goes through as an id-less
    // lead, so the worker pool counts it as a failure instead of losing it.
    let leads = entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            serde_json::from_value::<RawLead>(entry.clone()).unwrap_or_else(|problem| {
                warn!(
                    event_name = "crm.lead_undecodable",
                    position,
                    error = %problem,
                    "listed lead could not be decoded"
                );
                RawLead::default()
            })
        })
        .collect();
    let has_next = body.pointer("/_links/next").is_some_and(|next| !next.is_null());

    LeadPage::Leads { leads, has_next }
}

/// Turns a notes listing into call links. The note id doubles as the dedupe key.
pub fn decode_call_links(body: &Value) -> Vec<RawCallLink> {
    body.pointer("/_embedded/notes")
        .and_then(Value::as_array)
        .map(|notes| {
            notes
                .iter()
                .map(|note| RawCallLink {
                    note_id: note.get("id").cloned(),
                    call_link: note
                        .pointer("/params/link")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    note: match serde_json::from_value(note.clone()) {
                        Ok(decoded) => Some(decoded),
                        Err(problem) => {
                            warn!(
                                event_name = "crm.note_undecodable",
                                note_id = ?note.get("id"),
                                error = %problem,
                                "call note could not be decoded"
                            );
                            None
                        }
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Id of the first contact among a lead's links.
pub fn first_linked_contact(body: &Value) -> Option<i64> {
    body.pointer("/_embedded/links")?
        .as_array()?
        .iter()
        .filter(|link| link.get("to_entity_type").and_then(Value::as_str) == Some("contacts"))
        .find_map(|link| link.get("to_entity_id").and_then(Value::as_i64))
}
