use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// CRM note identifier. The only field that makes re-ingestion idempotent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupeKey(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
    Unknown,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub dedupe_key: DedupeKey,
    pub tenant_id: TenantId,
    pub lead_id: i64,
    pub lead_name: String,
    pub contact_id: i64,
    pub contact_name: String,
    pub administrator_name: String,
    pub traffic_source: String,
    pub direction: CallDirection,
    pub duration_seconds: u32,
    pub phone: String,
    pub audio_url: String,
    pub responsible_user_id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub processing_speed_minutes: u32,
    pub processing_speed_label: String,
    pub filtering_date: NaiveDate,
    pub audio_filename: Option<String>,
    pub transcription_filename: Option<String>,
    pub transcription_status: TranscriptionStatus,
}

impl CallRecord {
    /// `m:ss`, the form reports display next to the raw seconds.
    pub fn duration_formatted(&self) -> String {
        format_duration(self.duration_seconds)
    }

    /// Local audio file name shared with the transcription collaborator.
    pub fn audio_file_stem(&self) -> String {
        audio_file_stem(self.lead_id, &self.dedupe_key)
    }
}

pub fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn audio_file_stem(lead_id: i64, note: &DedupeKey) -> String {
    format!("lead_{lead_id}_note_{}", note.0)
}

#[cfg(test)]
mod tests {
    use super::{audio_file_stem, format_duration, CallDirection, DedupeKey, TranscriptionStatus};

    #[test]
    fn duration_is_rendered_as_minutes_and_padded_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3600), "60:00");
    }

    #[test]
    fn audio_file_stem_uses_lead_and_note_identifiers() {
        assert_eq!(audio_file_stem(42, &DedupeKey("9001".to_string())), "lead_42_note_9001");
    }

    #[test]
    fn status_strings_round_trip_through_parse() {
        for status in [
            TranscriptionStatus::Pending,
            TranscriptionStatus::Processing,
            TranscriptionStatus::Success,
            TranscriptionStatus::Failed,
        ] {
            assert_eq!(TranscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CallDirection::parse(" Outgoing "), Some(CallDirection::Outgoing));
        assert_eq!(TranscriptionStatus::parse("done"), None);
    }
}
