//! Enumeration of the dates a habit should have fired.

use chrono::NaiveDate;

use crate::habit::Recurrence;

/// Upper bound on dates produced by one enumeration.
///
/// A habit left unresolved for longer than this reports at most this many
/// misses; the ledger never grows by more per detection pass.
pub const MAX_ENUMERATED_DATES: usize = 365;

/// Every scheduled date in `[start, horizon)`, oldest first.
///
/// `start` itself is always emitted when it precedes `horizon`. Stops early
/// when the pattern cannot produce a next date, returning what was collected.
pub fn missed_dates(
    recurrence: &Recurrence,
    start: NaiveDate,
    horizon: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cursor = start;

    while cursor < horizon && dates.len() < MAX_ENUMERATED_DATES {
        dates.push(cursor);
        match recurrence.next_after(cursor) {
            Some(next) => cursor = next,
            None => {
                tracing::warn!(
                    pattern = recurrence.pattern_label(),
                    cursor = %cursor,
                    "recurrence pattern produced no next date; enumeration halted"
                );
                break;
            }
        }
    }

    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::calendar::{add_days, format_date, parse_date, RecurrencePattern};
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn daily_window_excludes_horizon() {
        let rec = Recurrence::new(RecurrencePattern::Daily);
        let dates: Vec<String> = missed_dates(&rec, d("2024-01-01"), d("2024-01-05"))
            .into_iter()
            .map(format_date)
            .collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"]);
    }

    #[test]
    fn empty_when_start_not_before_horizon() {
        let rec = Recurrence::new(RecurrencePattern::Daily);
        assert!(missed_dates(&rec, d("2024-01-05"), d("2024-01-05")).is_empty());
        assert!(missed_dates(&rec, d("2024-01-06"), d("2024-01-05")).is_empty());
    }

    #[test]
    fn weekly_days_enumerate_in_order() {
        let mut rec = Recurrence::new(RecurrencePattern::Weekly);
        rec.days = [1, 3].into_iter().collect();
        // Mon 2024-01-01 .. Mon 2024-01-15 (exclusive)
        let dates = missed_dates(&rec, d("2024-01-01"), d("2024-01-15"));
        assert_eq!(dates, vec![d("2024-01-01"), d("2024-01-03"), d("2024-01-08"), d("2024-01-10")]);
    }

    #[test]
    fn cap_at_365_for_long_neglect() {
        let rec = Recurrence::new(RecurrencePattern::Daily);
        let today = d("2025-06-01");
        let dates = missed_dates(&rec, add_days(today, -400), today);
        assert_eq!(dates.len(), MAX_ENUMERATED_DATES);
        assert_eq!(dates[0], add_days(today, -400));
    }

    #[test]
    fn malformed_pattern_returns_partial_result() {
        let rec = Recurrence {
            pattern: None,
            ..Recurrence::new(RecurrencePattern::Daily)
        };
        let dates = missed_dates(&rec, d("2024-01-01"), d("2024-02-01"));
        assert_eq!(dates, vec![d("2024-01-01")]);
    }

    #[test]
    fn monthly_from_month_end() {
        let rec = Recurrence::new(RecurrencePattern::Monthly);
        let dates = missed_dates(&rec, d("2024-01-31"), d("2024-03-01"));
        assert_eq!(dates, vec![d("2024-01-31"), d("2024-02-29")]);
    }

    proptest! {
        #[test]
        fn never_exceeds_cap_and_is_strictly_increasing(
            back in 0i64..2_000,
            interval in 1u32..10,
        ) {
            let mut rec = Recurrence::new(RecurrencePattern::Custom);
            rec.interval = interval;
            let today = d("2024-06-15");
            let dates = missed_dates(&rec, add_days(today, -back), today);
            prop_assert!(dates.len() <= MAX_ENUMERATED_DATES);
            prop_assert!(dates.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(dates.iter().all(|date| *date < today));
        }
    }
}
