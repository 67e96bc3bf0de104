//! Pure date arithmetic for recurrence patterns.
//!
//! All dates are calendar dates ([`NaiveDate`]) interpreted as UTC midnight.
//! Nothing here reads the clock.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// ISO date format used for storage and display.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How often a habit repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    /// Every day
    Daily,
    /// Every week, optionally on a fixed set of weekdays
    Weekly,
    /// Same day of month, clamped to the month's last day
    Monthly,
    /// Every `interval` days
    Custom,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Custom => "custom",
        }
    }

    /// Approximate length of one repetition in days.
    pub fn window_days(&self, interval: u32) -> i64 {
        match self {
            RecurrencePattern::Daily => 1,
            RecurrencePattern::Weekly => 7,
            RecurrencePattern::Monthly => 30,
            RecurrencePattern::Custom => i64::from(interval.max(1)),
        }
    }
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrencePattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            "custom" => Ok(RecurrencePattern::Custom),
            other => Err(ValidationError::InvalidValue {
                field: "pattern".to_string(),
                message: format!("unknown recurrence pattern '{other}'"),
            }),
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Shift a date by `n` days (negative moves backwards).
///
/// Saturates at the representable calendar bounds.
pub fn add_days(date: NaiveDate, n: i64) -> NaiveDate {
    TimeDelta::try_days(n)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if n < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Day of week with Sunday = 0 .. Saturday = 6.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Next date the pattern fires strictly after `cursor`.
///
/// Returns `None` for a missing pattern, which callers treat as a halt.
pub fn next_occurrence_after(
    pattern: Option<RecurrencePattern>,
    interval: u32,
    days: &BTreeSet<u8>,
    cursor: NaiveDate,
) -> Option<NaiveDate> {
    match pattern? {
        RecurrencePattern::Daily => cursor.checked_add_signed(TimeDelta::days(1)),
        RecurrencePattern::Weekly => {
            let mut valid = days.iter().copied().filter(|day| *day <= 6).peekable();
            let Some(&first) = valid.peek() else {
                return cursor.checked_add_signed(TimeDelta::days(7));
            };
            let dow = day_of_week(cursor);
            let offset = match valid.find(|day| *day > dow) {
                Some(next) => i64::from(next - dow),
                None => 7 - i64::from(dow) + i64::from(first),
            };
            cursor.checked_add_signed(TimeDelta::days(offset))
        }
        RecurrencePattern::Monthly => cursor.checked_add_months(Months::new(1)),
        RecurrencePattern::Custom => {
            cursor.checked_add_signed(TimeDelta::days(i64::from(interval.max(1))))
        }
    }
}
