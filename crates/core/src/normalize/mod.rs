//! Record Normalizer: one [`LeadContext`] in, zero or more [`CallRecord`]s out.

pub mod fields;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::domain::call_record::{
    CallDirection, CallRecord, DedupeKey, TenantId, TranscriptionStatus,
};
use crate::domain::lead::{CallLink, LeadContext, NoteType};
use fields::{field_value, processing_speed_minutes, LeadField};

pub const DEFAULT_CONTACT_NAME: &str = "Без имени";
pub const UNKNOWN_PHONE: &str = "Неизвестный";

const INCOMING_CALL_CODE: i64 = 10;
const OUTGOING_CALL_CODE: i64 = 11;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedLead {
    pub records: Vec<CallRecord>,
    pub had_calls: bool,
    pub dropped: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    skip_hosts: Vec<String>,
}

impl Normalizer {
    /// `skip_hosts` lists audio hosts whose recordings are never ingested.
    pub fn new(skip_hosts: Vec<String>) -> Self {
        let skip_hosts = skip_hosts.into_iter().map(|host| host.trim().to_ascii_lowercase()).collect();
        Self { skip_hosts }
    }

    pub fn normalize(
        &self,
        tenant_id: &TenantId,
        sync_day: NaiveDate,
        context: LeadContext,
        ingested_at: DateTime<Utc>,
    ) -> NormalizedLead {
        let LeadContext { lead, contact, call_links } = context;

        let Some(contact) = contact else {
            debug!(lead_id = lead.id, "lead has no contact, nothing to normalize");
            return NormalizedLead::default();
        };

        let administrator_name = field_value(&lead.custom_fields, LeadField::Administrator);
        let traffic_source = field_value(&lead.custom_fields, LeadField::TrafficSource);
        let processing_speed_label = field_value(&lead.custom_fields, LeadField::ProcessingSpeed);
        let processing_speed = processing_speed_minutes(&processing_speed_label);
        let contact_name = contact.name.clone().unwrap_or_else(|| DEFAULT_CONTACT_NAME.to_string());

        let mut normalized =
            NormalizedLead { had_calls: !call_links.is_empty(), ..NormalizedLead::default() };

        for link in call_links {
            let Some(audio_url) = self.usable_audio_url(&link) else {
                continue;
            };
            let duration_seconds = match link.duration_seconds {
                Some(seconds) if seconds > 0 => seconds,
                _ => continue,
            };
            let Some(note_id) = link.note_id.clone() else {
                warn!(lead_id = lead.id, contact_id = contact.id, "dropping call without note id");
                normalized.dropped += 1;
                continue;
            };

            normalized.records.push(CallRecord {
                dedupe_key: DedupeKey(note_id),
                tenant_id: tenant_id.clone(),
                lead_id: lead.id,
                lead_name: lead.name.clone(),
                contact_id: contact.id,
                contact_name: contact_name.clone(),
                administrator_name: administrator_name.clone(),
                traffic_source: traffic_source.clone(),
                direction: classify_direction(&link.note_type),
                duration_seconds,
                phone: link.phone.clone().unwrap_or_else(|| UNKNOWN_PHONE.to_string()),
                audio_url,
                responsible_user_id: lead.responsible_user_id,
                occurred_at: link.created_at.unwrap_or(ingested_at),
                ingested_at,
                processing_speed_minutes: processing_speed,
                processing_speed_label: processing_speed_label.clone(),
                filtering_date: sync_day,
                audio_filename: None,
                transcription_filename: None,
                transcription_status: TranscriptionStatus::Pending,
            });
        }

        normalized
    }

    fn usable_audio_url(&self, link: &CallLink) -> Option<String> {
        let url = link.url.as_deref()?;
        if is_note_endpoint_artifact(url) {
            return None;
        }
        if let Some(host) = url_host(url) {
            if self.skip_hosts.iter().any(|skipped| *skipped == host) {
                return None;
            }
        }
        Some(url.to_string())
    }
}

pub fn classify_direction(note_type: &NoteType) -> CallDirection {
    match note_type {
        NoteType::Code(INCOMING_CALL_CODE) => CallDirection::Incoming,
        NoteType::Code(OUTGOING_CALL_CODE) => CallDirection::Outgoing,
        NoteType::Label(label) => {
            let label = label.to_ascii_lowercase();
            if label.contains("in") {
                CallDirection::Incoming
            } else if label.contains("out") {
                CallDirection::Outgoing
            } else {
                CallDirection::Unknown
            }
        }
        _ => CallDirection::Unknown,
    }
}

/// Links pointing back at the CRM's own notes API rather than at a recording.
fn is_note_endpoint_artifact(url: &str) -> bool {
    url.contains("/api/v4/contacts/") && url.contains("/notes/")
}

/// Lowercased host of an absolute URL, without port or credentials.
pub fn url_host(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host_port.split(':').next()?.trim();
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{classify_direction, url_host, Normalizer};
    use crate::domain::call_record::{CallDirection, TenantId, TranscriptionStatus};
    use crate::domain::lead::{CallLink, ContactDetail, CustomField, LeadContext, LeadDetail, NoteType};

    fn sync_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 5).expect("date")
    }

    fn link(note_id: Option<&str>, url: &str, duration: Option<u32>, note_type: NoteType) -> CallLink {
        CallLink {
            note_id: note_id.map(str::to_string),
            url: Some(url.to_string()),
            note_type,
            duration_seconds: duration,
            phone: Some("+79001234567".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2025, 4, 4, 22, 30, 0).single().expect("ts")),
        }
    }

    fn context(call_links: Vec<CallLink>, with_contact: bool) -> LeadContext {
        LeadContext {
            lead: LeadDetail {
                id: 77,
                name: "Первичная консультация".to_string(),
                responsible_user_id: Some(12),
                custom_fields: vec![
                    CustomField { name: "Администратор".to_string(), value: Some("Ольга".to_string()) },
                    CustomField {
                        name: "Скорость обработки".to_string(),
                        value: Some("10 - 15 мин".to_string()),
                    },
                ],
            },
            contact: with_contact.then(|| ContactDetail { id: 900, name: None }),
            call_links,
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(vec!["media.uiscom.ru".to_string()])
    }

    #[test]
    fn lead_without_contact_produces_nothing() {
        let links = vec![link(Some("1"), "https://rec.example/1.mp3", Some(30), NoteType::Code(10))];
        let result = normalizer().normalize(
            &TenantId("clinic".to_string()),
            sync_day(),
            context(links, false),
            Utc::now(),
        );

        assert!(result.records.is_empty());
        assert!(!result.had_calls);
    }

    #[test]
    fn builds_records_with_custom_fields_and_sync_day() {
        let links = vec![link(Some("501"), "https://rec.example/501.mp3", Some(65), NoteType::Code(11))];
        let result = normalizer().normalize(
            &TenantId("clinic".to_string()),
            sync_day(),
            context(links, true),
            Utc::now(),
        );

        assert!(result.had_calls);
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.dedupe_key.0, "501");
        assert_eq!(record.administrator_name, "Ольга");
        assert_eq!(record.traffic_source, "Неопределенный");
        assert_eq!(record.processing_speed_minutes, 10);
        assert_eq!(record.contact_name, "Без имени");
        assert_eq!(record.direction, CallDirection::Outgoing);
        assert_eq!(record.duration_formatted(), "1:05");
        assert_eq!(record.responsible_user_id, Some(12));
        assert_eq!(record.transcription_status, TranscriptionStatus::Pending);
        // The note happened the evening before in UTC; the record still belongs to the sync day.
        assert_eq!(record.filtering_date, sync_day());
    }

    #[test]
    fn filters_artifacts_silent_calls_skipped_hosts_and_keyless_notes() {
        let links = vec![
            link(Some("1"), "https://clinic.amocrm.ru/api/v4/contacts/900/notes/1", Some(30), NoteType::Code(10)),
            link(Some("2"), "https://rec.example/2.mp3", Some(0), NoteType::Code(10)),
            link(Some("3"), "https://rec.example/3.mp3", None, NoteType::Code(10)),
            link(Some("4"), "https://media.uiscom.ru/4.mp3", Some(30), NoteType::Code(10)),
            link(None, "https://rec.example/5.mp3", Some(30), NoteType::Code(10)),
            link(Some("6"), "https://rec.example/6.mp3", Some(30), NoteType::Label("call_in".into())),
        ];
        let result = normalizer().normalize(
            &TenantId("clinic".to_string()),
            sync_day(),
            context(links, true),
            Utc::now(),
        );

        let keys: Vec<_> = result.records.iter().map(|record| record.dedupe_key.0.as_str()).collect();
        assert_eq!(keys, vec!["6"]);
        assert_eq!(result.dropped, 1);
        assert!(result.had_calls);
    }

    #[test]
    fn direction_codes_and_labels() {
        assert_eq!(classify_direction(&NoteType::Code(10)), CallDirection::Incoming);
        assert_eq!(classify_direction(&NoteType::Code(11)), CallDirection::Outgoing);
        assert_eq!(classify_direction(&NoteType::Code(4)), CallDirection::Unknown);
        assert_eq!(classify_direction(&NoteType::Label("call_in".into())), CallDirection::Incoming);
        assert_eq!(classify_direction(&NoteType::Label("call_out".into())), CallDirection::Outgoing);
        assert_eq!(classify_direction(&NoteType::Label("sms".into())), CallDirection::Unknown);
        assert_eq!(classify_direction(&NoteType::Missing), CallDirection::Unknown);
    }

    #[test]
    fn host_extraction_strips_credentials_and_port() {
        assert_eq!(url_host("https://Media.Comagic.ru/x/y.mp3").as_deref(), Some("media.comagic.ru"));
        assert_eq!(url_host("http://u:p@10.0.0.1:8080/a").as_deref(), Some("10.0.0.1"));
        assert_eq!(url_host("not a url"), None);
    }
}
