//! Recurrence scheduling: calendar arithmetic, occurrence enumeration and
//! cursor advancement.

pub mod advance;
pub mod calendar;
pub mod occurrences;

pub use advance::{advance, Advance};
pub use calendar::{add_days, format_date, next_occurrence_after, parse_date, RecurrencePattern};
pub use occurrences::{missed_dates, MAX_ENUMERATED_DATES};
