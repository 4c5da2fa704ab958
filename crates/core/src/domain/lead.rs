//! CRM payload shapes and the decoding step that turns them into a typed
//! [`LeadContext`].
//!
//! The `Raw*` structs mirror what the CRM sends and tolerate missing or
//! oddly typed fields: a scalar of the wrong type reads as absent, numbers
//! may arrive as strings, and timestamps may be epoch seconds or RFC 3339.
//! Everything past [`LeadContext::decode`] works on
//! plain Rust types, so "field absent" handling lives only in this module.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLead {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub custom_fields_values: Option<Vec<RawCustomField>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCustomField {
    #[serde(default, deserialize_with = "lenient::int")]
    pub field_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub field_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub values: Option<Vec<RawFieldValue>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFieldValue {
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawContact {
    #[serde(default, deserialize_with = "lenient::int")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
}

/// One call-link entry as listed under a contact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCallLink {
    #[serde(default)]
    pub note_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub call_link: Option<String>,
    #[serde(default, deserialize_with = "lenient::nested")]
    pub note: Option<RawNote>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub note_type: Option<Value>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient::nested")]
    pub params: Option<RawNoteParams>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNoteParams {
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub link: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadDetail {
    pub id: i64,
    pub name: String,
    pub responsible_user_id: Option<i64>,
    pub custom_fields: Vec<CustomField>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomField {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactDetail {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoteType {
    Code(i64),
    Label(String),
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallLink {
    pub note_id: Option<String>,
    pub url: Option<String>,
    pub note_type: NoteType,
    pub duration_seconds: Option<u32>,
    pub phone: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Everything fetched for one lead in one pass. Consumed by the normalizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadContext {
    pub lead: LeadDetail,
    pub contact: Option<ContactDetail>,
    pub call_links: Vec<CallLink>,
}

impl LeadContext {
    pub fn decode(
        lead: RawLead,
        contact: Option<RawContact>,
        call_links: Vec<RawCallLink>,
    ) -> Result<Self, DomainError> {
        let lead = LeadDetail::decode(lead)?;
        let contact = contact.and_then(ContactDetail::decode);
        let call_links = call_links.into_iter().map(CallLink::decode).collect();
        Ok(Self { lead, contact, call_links })
    }
}

impl LeadDetail {
    fn decode(raw: RawLead) -> Result<Self, DomainError> {
        let id = raw.id.ok_or_else(|| {
            DomainError::InvariantViolation("lead payload has no `id`".to_string())
        })?;

        let custom_fields = raw
            .custom_fields_values
            .unwrap_or_default()
            .into_iter()
            .filter_map(|field| {
                let name = field.field_name?.trim().to_string();
                let value = field
                    .values
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .and_then(|entry| entry.value)
                    .and_then(value_as_text);
                Some(CustomField { name, value })
            })
            .collect();

        Ok(Self {
            id,
            name: raw.name.unwrap_or_default(),
            responsible_user_id: raw.responsible_user_id,
            custom_fields,
        })
    }
}

impl ContactDetail {
    fn decode(raw: RawContact) -> Option<Self> {
        let id = raw.id?;
        let name = raw.name.map(|name| name.trim().to_string()).filter(|name| !name.is_empty());
        Some(Self { id, name })
    }
}

impl CallLink {
    fn decode(raw: RawCallLink) -> Self {
        let note = raw.note.unwrap_or_default();
        let params = note.params.unwrap_or_default();

        let note_id = raw.note_id.and_then(value_as_text).or_else(|| note.id.and_then(value_as_text));
        let url = raw
            .call_link
            .or(params.link)
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty());
        let note_type = match note.note_type {
            Some(Value::Number(number)) => number.as_i64().map_or(NoteType::Missing, NoteType::Code),
            Some(Value::String(label)) => NoteType::Label(label),
            _ => NoteType::Missing,
        };

        Self {
            note_id,
            url,
            note_type,
            duration_seconds: params.duration.and_then(value_as_seconds),
            phone: params.phone.and_then(value_as_text),
            created_at: note.created_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

fn value_as_text(value: Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn value_as_seconds(value: Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|seconds| u32::try_from(seconds).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Field deserializers that never fail on a present-but-odd value.
mod lenient {
    use chrono::DateTime;
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    /// Epoch seconds, as a number or a string, or an RFC 3339 date-time.
    pub fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => {
                let text = text.trim();
                text.parse().ok().or_else(|| {
                    DateTime::parse_from_rfc3339(text).ok().map(|at| at.timestamp())
                })
            }
            _ => None,
        })
    }

    pub fn nested<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).ok())
    }

    /// Keeps the entries that decode; a non-array reads as absent.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(entries) => {
                Some(entries.into_iter().filter_map(|entry| serde_json::from_value(entry).ok()).collect())
            }
            _ => None,
        })
    }
}
