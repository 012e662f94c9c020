//! Yearly recurrence math for birthdays.
//!
//! Only month and day of a birth date take part in recurrence. A Feb 29
//! birth date is observed on Feb 28 in non-leap years.

use chrono::{Datelike, NaiveDate};

use crate::types::BirthdayRecord;

/// The anniversary of `birth_date` in `year`.
pub fn anniversary_in(birth_date: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birth_date.month(), birth_date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(birth_date)
}

/// Next anniversary on or after `today`.
///
/// Always within `[today, today + 365 days]`.
pub fn next_occurrence(birth_date: NaiveDate, today: NaiveDate) -> NaiveDate {
    let candidate = anniversary_in(birth_date, today.year());
    if candidate < today {
        anniversary_in(birth_date, today.year() + 1)
    } else {
        candidate
    }
}

/// Whole days from `today` to the next anniversary; 0 means today.
pub fn days_until(birth_date: NaiveDate, today: NaiveDate) -> i64 {
    (next_occurrence(birth_date, today) - today).num_days()
}

/// `MM-DD` key, the same shape SQLite's `strftime('%m-%d', ..)` produces.
pub fn month_day_key(date: NaiveDate) -> String {
    date.format("%m-%d").to_string()
}

/// Stable sort by next occurrence; records on the same day keep their order.
pub fn sort_by_next_occurrence(records: &mut [BirthdayRecord], today: NaiveDate) {
    records.sort_by_key(|r| next_occurrence(r.birth_date, today));
}

/// A `[today, today + days]` range in month-day space.
///
/// When the range crosses New Year the window wraps: `start > end` and a
/// key matches if it is `>= start` or `<= end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthDayWindow {
    pub start: String,
    pub end: String,
    /// Covers the whole year; every key matches.
    pub all: bool,
}

impl MonthDayWindow {
    pub fn starting(today: NaiveDate, within_days: u32) -> Self {
        let start = month_day_key(today);
        if within_days >= 365 {
            return Self { end: start.clone(), start, all: true };
        }
        let last = today + chrono::Duration::days(i64::from(within_days));
        let mut end = month_day_key(last);
        // Feb 29 birthdays are observed on Feb 28 in non-leap years.
        if end == "02-28" && !is_leap_year(last.year()) {
            end = "02-29".into();
        }
        Self { start, end, all: false }
    }

    pub fn wraps(&self) -> bool {
        !self.all && self.start > self.end
    }

    pub fn contains(&self, key: &str) -> bool {
        if self.all {
            true
        } else if self.wraps() {
            key >= self.start.as_str() || key <= self.end.as_str()
        } else {
            key >= self.start.as_str() && key <= self.end.as_str()
        }
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.contains(&month_day_key(date))
    }
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}
