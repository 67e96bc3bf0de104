//! Clock and argument helpers shared by the subcommands.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use cadence_core::schedule::parse_date;

/// clap value parser for `YYYY-MM-DD` arguments.
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}

/// Current instant, or noon UTC on `today` when the clock is overridden.
pub fn clock(today: Option<NaiveDate>) -> DateTime<Utc> {
    match today {
        Some(date) => date
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
            .and_utc(),
        None => Utc::now(),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
