use chrono::NaiveDate;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("unrecognized date `{0}` (expected DD.MM.YYYY, YYYY-MM-DD, YYYY.MM.DD or DD-MM-YYYY)")]
    UnrecognizedDate(String),
    #[error("proxy string must look like `ip:port:user:password`")]
    InvalidProxyString,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("credential resolution failed: {0}")]
    Credentials(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable label used in operator-facing JSON outcomes.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::InvalidDateRange { .. })
            | Self::Domain(DomainError::UnrecognizedDate(_)) => "invalid_input",
            Self::Domain(_) => "domain_validation",
            Self::Credentials(_) => "credentials",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "config_validation",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Domain(_) => 3,
            Self::Credentials(_) => 4,
            Self::Persistence(_) => 5,
            Self::Integration(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn invalid_range_is_reported_as_caller_input_error() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).expect("date");
        let end = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        let error = ApplicationError::from(DomainError::InvalidDateRange { start, end });

        assert_eq!(error.error_class(), "invalid_input");
        assert_eq!(error.exit_code(), 3);
        assert_eq!(error.to_string(), "start date 2025-03-10 is after end date 2025-03-01");
    }

    #[test]
    fn credential_failures_have_their_own_class() {
        let error = ApplicationError::Credentials("tenant `clinic-9` is not configured".into());
        assert_eq!(error.error_class(), "credentials");
        assert_eq!(error.exit_code(), 4);
    }
}
