use chrono::{NaiveDate, NaiveTime};

use crate::errors::DomainError;

const ACCEPTED_DAY_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d", "%Y.%m.%d", "%d-%m-%Y"];

pub fn parse_day(value: &str) -> Result<NaiveDate, DomainError> {
    let trimmed = value.trim();
    ACCEPTED_DAY_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| DomainError::UnrecognizedDate(value.to_string()))
}

/// Inclusive UTC bounds of one calendar day, as Unix timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub from: i64,
    pub to: i64,
}

impl DayWindow {
    pub fn for_day(day: NaiveDate) -> Self {
        let from = day.and_time(NaiveTime::MIN).and_utc().timestamp();
        Self { day, from, to: from + 86_399 }
    }
}

/// Days from `start` through `end`, both inclusive.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DomainError> {
    if start > end {
        return Err(DomainError::InvalidDateRange { start, end });
    }
    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}
