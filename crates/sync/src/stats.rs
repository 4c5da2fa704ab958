use serde::Serialize;

use callsync_core::domain::sync_run::DayStatus;

/// Counters for one day (or, merged, for a whole range).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DayStats {
    /// Leads handed to the worker pool, whatever their outcome.
    pub leads_processed: u32,
    pub leads_succeeded: u32,
    pub leads_with_calls: u32,
    /// Newly inserted call records.
    pub calls_saved: u32,
    /// Existing call records rewritten from fresh CRM data.
    pub calls_updated: u32,
    pub errors: u32,
    pub duration_ms: u64,
}

impl DayStats {
    pub fn merge(&mut self, other: &DayStats) {
        self.leads_processed += other.leads_processed;
        self.leads_succeeded += other.leads_succeeded;
        self.leads_with_calls += other.leads_with_calls;
        self.calls_saved += other.calls_saved;
        self.calls_updated += other.calls_updated;
        self.errors += other.errors;
        self.duration_ms += other.duration_ms;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RangeTotals {
    #[serde(flatten)]
    pub stats: DayStats,
    pub days_completed: u32,
    pub days_completed_no_leads: u32,
    pub days_completed_with_errors: u32,
    pub days_failed: u32,
    pub days_skipped: u32,
}

impl RangeTotals {
    pub fn record_day(&mut self, status: DayStatus, stats: &DayStats) {
        self.stats.merge(stats);
        let counter = match status {
            DayStatus::Completed => &mut self.days_completed,
            DayStatus::CompletedNoLeads => &mut self.days_completed_no_leads,
            DayStatus::CompletedWithErrors => &mut self.days_completed_with_errors,
            DayStatus::FailedDayProcessing => &mut self.days_failed,
            DayStatus::Skipped => &mut self.days_skipped,
        };
        *counter += 1;
    }

    pub fn days(&self) -> u32 {
        self.days_completed
            + self.days_completed_no_leads
            + self.days_completed_with_errors
            + self.days_failed
            + self.days_skipped
    }
}

#[cfg(test)]
mod tests {
    use callsync_core::domain::sync_run::DayStatus;

    use super::{DayStats, RangeTotals};

    #[test]
    fn totals_sum_counters_and_bucket_days() {
        let busy = DayStats {
            leads_processed: 4,
            leads_succeeded: 3,
            leads_with_calls: 2,
            calls_saved: 5,
            calls_updated: 1,
            errors: 1,
            duration_ms: 120,
        };
        let mut totals = RangeTotals::default();
        totals.record_day(DayStatus::CompletedWithErrors, &busy);
        totals.record_day(DayStatus::Skipped, &DayStats::default());
        totals.record_day(DayStatus::CompletedNoLeads, &DayStats { duration_ms: 3, ..DayStats::default() });

        assert_eq!(totals.days(), 3);
        assert_eq!(totals.days_completed_with_errors, 1);
        assert_eq!(totals.days_skipped, 1);
        assert_eq!(totals.stats.calls_saved, 5);
        assert_eq!(totals.stats.duration_ms, 123);
    }
}
