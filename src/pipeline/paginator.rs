//! Backward date windows over `[final_start, tomorrow)`.
//!
//! The upstream silently truncates every query at 1000 rows. The densest
//! source publishes well under 100 records per day, so a 10-day window stays
//! below the cap.
//!
//! Boundary rule: the walk stops as soon as a window's start reaches
//! `final_start` (`window_start <= final_start`), and that window is clamped to
//! start exactly at `final_start`. A window never starts before
//! `final_start` and no empty trailing window is produced.

use chrono::NaiveDate;

use crate::error::MetricsError;
use crate::utils::{add_days, parse_date, sub_days, today_utc};

/// Default window width in days.
pub const DEFAULT_OFFSET_DAYS: u64 = 10;

/// Half-open `[start, end)` range of days queried in one upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Plan of windows to fetch. Cheap to copy; every call to [`windows`](Self::windows)
/// restarts the walk from tomorrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindowPaginator {
    final_start: NaiveDate,
    offset_days: u64,
    tomorrow: NaiveDate,
}

impl DateWindowPaginator {
    /// `offset_days` of zero is treated as one.
    pub fn new(final_start: NaiveDate, offset_days: u64, today: NaiveDate) -> Self {
        Self {
            final_start,
            offset_days: offset_days.max(1),
            tomorrow: add_days(today, 1),
        }
    }

    /// Build a plan from a caller-supplied `YYYY-MM-DD` start date, anchored at the current UTC day.
    pub fn from_start_date(
        start_date: &str,
        offset_days: Option<u64>,
    ) -> Result<Self, MetricsError> {
        let final_start = parse_date(start_date)?;
        Ok(Self::new(
            final_start,
            offset_days.unwrap_or(DEFAULT_OFFSET_DAYS),
            today_utc(),
        ))
    }

    pub fn final_start(&self) -> NaiveDate {
        self.final_start
    }

    pub fn offset_days(&self) -> u64 {
        self.offset_days
    }

    pub fn windows(&self) -> DateWindows {
        DateWindows {
            final_start: self.final_start,
            offset_days: self.offset_days,
            next_end: Some(self.tomorrow),
        }
    }
}

impl IntoIterator for &DateWindowPaginator {
    type Item = DateWindow;
    type IntoIter = DateWindows;

    fn into_iter(self) -> Self::IntoIter {
        self.windows()
    }
}

/// Lazy iterator over windows, newest first.
#[derive(Debug, Clone)]
pub struct DateWindows {
    final_start: NaiveDate,
    offset_days: u64,
    next_end: Option<NaiveDate>,
}

impl Iterator for DateWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.next_end?;

        if end <= self.final_start {
            self.next_end = None;
            return None;
        }

        let start = sub_days(end, self.offset_days);
        if start <= self.final_start {
            self.next_end = None;
            return Some(DateWindow {
                start: self.final_start,
                end,
            });
        }

        self.next_end = Some(start);
        Some(DateWindow { start, end })
    }
}

impl std::iter::FusedIterator for DateWindows {}
