//! Calendar helpers. Every date in the pipeline is a UTC calendar day.

use chrono::{Days, NaiveDate, Utc};

use crate::error::MetricsError;

/// Wire format of every date the pipeline accepts or emits.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date supplied by a caller.
pub fn parse_date(input: &str) -> Result<NaiveDate, MetricsError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|e| MetricsError::InvalidDate(format!("{:?} is not a YYYY-MM-DD date: {}", input, e)))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Current UTC day (UTC midnight).
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// `date` shifted forward by `days`, saturating at the calendar maximum.
pub fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// `date` shifted backward by `days`, saturating at the calendar minimum.
pub fn sub_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}
