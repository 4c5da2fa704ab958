pub mod concurrency;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod normalize;

pub use chrono;

pub use concurrency::adaptive_concurrency;
pub use dates::{days_in_range, parse_day, DayWindow};
pub use domain::call_record::{
    CallDirection, CallRecord, DedupeKey, TenantId, TranscriptionStatus,
};
pub use domain::download::{AudioOutcome, DownloadResult};
pub use domain::lead::{LeadContext, RawCallLink, RawContact, RawLead};
pub use domain::sync_run::{DayStatus, SyncRun};
pub use errors::{ApplicationError, DomainError};
pub use normalize::{NormalizedLead, Normalizer};
