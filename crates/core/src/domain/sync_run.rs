use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::call_record::TenantId;

/// Persisted proof that a (tenant, day) pair has been processed.
///
/// Written once when a day finishes, including days with zero leads. A day
/// that failed while fetching leads never gets one, so it is retried on the
/// next run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub tenant_id: TenantId,
    pub day: NaiveDate,
    pub status: DayStatus,
    pub leads_processed: u32,
    pub calls_saved: u32,
    pub errors: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Skipped,
    CompletedNoLeads,
    Completed,
    CompletedWithErrors,
    FailedDayProcessing,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::CompletedNoLeads => "completed_no_leads",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::FailedDayProcessing => "failed_day_processing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skipped" => Some(Self::Skipped),
            "completed_no_leads" => Some(Self::CompletedNoLeads),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "failed_day_processing" => Some(Self::FailedDayProcessing),
            _ => None,
        }
    }

    /// Whether finishing in this state earns the day its marker.
    pub fn writes_marker(&self) -> bool {
        matches!(self, Self::CompletedNoLeads | Self::Completed | Self::CompletedWithErrors)
    }
}
