/// Upper bound on concurrent lead workers regardless of what was requested.
pub const MAX_LEAD_WORKERS: usize = 10;

const LEADS_PER_WORKER: usize = 5;

/// Permit count for one day's worker pool.
///
/// Days with five or fewer leads get at most one worker per lead. Larger days
/// get one worker per five leads, capped at [`MAX_LEAD_WORKERS`] and at the
/// requested concurrency. Never returns zero.
pub fn adaptive_concurrency(requested: usize, lead_count: usize) -> usize {
    let requested = requested.max(1);
    if lead_count <= LEADS_PER_WORKER {
        return requested.min(lead_count).max(1);
    }

    let workload_cap = (lead_count / LEADS_PER_WORKER).clamp(1, MAX_LEAD_WORKERS);
    requested.min(workload_cap)
}

#[cfg(test)]
mod tests {
    use super::{adaptive_concurrency, MAX_LEAD_WORKERS};

    #[test]
    fn small_days_get_one_worker_per_lead() {
        assert_eq!(adaptive_concurrency(5, 3), 3);
        assert_eq!(adaptive_concurrency(2, 5), 2);
        assert_eq!(adaptive_concurrency(8, 1), 1);
    }

    #[test]
    fn empty_day_still_reports_one_permit() {
        assert_eq!(adaptive_concurrency(5, 0), 1);
        assert_eq!(adaptive_concurrency(0, 0), 1);
    }

    #[test]
    fn medium_days_scale_with_lead_count() {
        assert_eq!(adaptive_concurrency(5, 6), 1);
        assert_eq!(adaptive_concurrency(5, 14), 2);
        assert_eq!(adaptive_concurrency(5, 25), 5);
        assert_eq!(adaptive_concurrency(3, 25), 3);
    }

    #[test]
    fn bound_never_exceeds_the_global_cap() {
        assert_eq!(adaptive_concurrency(50, 1_000), MAX_LEAD_WORKERS);
        for leads in 6..200 {
            for requested in 1..20 {
                let bound = adaptive_concurrency(requested, leads);
                assert!(bound >= 1);
                assert!(bound <= (leads / 5).clamp(1, MAX_LEAD_WORKERS));
                assert!(bound <= requested);
            }
        }
    }
}
