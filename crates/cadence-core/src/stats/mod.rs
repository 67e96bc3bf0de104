//! Statistics module for Cadence
//!
//! Read-side analytics over habits, task records and the missed ledger:
//! per-habit compliance, per-category mastery, lag indicators and missed-task
//! triage. Nothing here writes to the store.

mod lag;
mod mastery;
mod recurring;
mod triage;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub use lag::{get_lag_indicators, LagAnalyzer, LagIndicator, LagReport};
pub use mastery::{get_task_mastery_stats, MasteryAnalyzer, MasteryStats, Trend};
pub use recurring::{
    get_all_recurring_stats, get_recurring_stats, DayStatus, HistoryDay, RecurringStats,
    RecurringStatsAnalyzer,
};
pub use triage::{
    get_missed_tasks_analysis, MissedTaskAnalyzer, MissedTasksAnalysis, MissedTasksSummary,
    NeverStartedTask, OverdueTask, SkippedRecurring,
};

/// Reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// 7 days
    Week,
    /// 30 days
    #[default]
    Month,
    /// 90 days
    Quarter,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
        }
    }

    /// Start of the window ending at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::days(self.days())
    }

    /// Boundary between the first and second half of the window.
    pub fn midpoint(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::hours(self.days() * 12)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            other => Err(ValidationError::InvalidValue {
                field: "period".to_string(),
                message: format!("expected week, month or quarter, got '{other}'"),
            }),
        }
    }
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
