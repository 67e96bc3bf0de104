//! Task records and the recurrence fields that turn a task into a habit.
//!
//! A recurring task is either the root of its schedule or an occurrence that
//! points back at a root:
//!
//! ```text
//!   Root ──────── owns deadline cursor + missed ledger
//!    ^
//!    └── Occurrence { root_id } ── completed instance, never scheduled
//! ```
//!
//! Only roots are scheduled by detection.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schedule::calendar::{self, RecurrencePattern};

/// Task priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ValidationError::InvalidValue {
                field: "priority".to_string(),
                message: format!("expected high, medium or low, got '{other}'"),
            }),
        }
    }
}

/// Recurrence definition carried by a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// `None` when the stored pattern is absent or unrecognised.
    pub pattern: Option<RecurrencePattern>,
    /// Day multiplier for `custom`; always at least 1.
    pub interval: u32,
    /// Weekdays (Sunday = 0) for `weekly`; empty means every 7 days.
    #[serde(default)]
    pub days: BTreeSet<u8>,
    pub start_date: Option<NaiveDate>,
}

impl Recurrence {
    pub fn new(pattern: RecurrencePattern) -> Self {
        Self {
            pattern: Some(pattern),
            interval: 1,
            days: BTreeSet::new(),
            start_date: None,
        }
    }

    /// Next scheduled date strictly after `cursor`.
    pub fn next_after(&self, cursor: NaiveDate) -> Option<NaiveDate> {
        calendar::next_occurrence_after(self.pattern, self.interval, &self.days, cursor)
    }

    /// Stored pattern name, `"unknown"` when malformed.
    pub fn pattern_label(&self) -> &'static str {
        self.pattern.map(|p| p.as_str()).unwrap_or("unknown")
    }
}

/// Position of a task in its recurrence family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceLink {
    /// Canonical definition owning the schedule cursor
    #[default]
    Root,
    /// Instance of the habit rooted at `root_id`
    Occurrence { root_id: String },
}

/// Running counters kept on a root habit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitCounters {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_missed: u32,
    pub total_completed: u32,
    pub last_completed_date: Option<NaiveDate>,
}

/// A task record, recurring or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Next due date; for a root habit this is the schedule cursor.
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub time_logged_minutes: u64,
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub link: RecurrenceLink,
    #[serde(default)]
    pub counters: HabitCounters,
}

impl Task {
    /// Create a new one-off task.
    pub fn new(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            category: None,
            priority: Priority::default(),
            done: false,
            created_at,
            completed_at: None,
            deadline: None,
            time_logged_minutes: 0,
            recurrence: None,
            link: RecurrenceLink::Root,
            counters: HabitCounters::default(),
        }
    }

    /// Create a root habit whose first due date is `first_due`.
    pub fn new_habit(
        text: impl Into<String>,
        recurrence: Recurrence,
        first_due: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        let recurrence = Recurrence {
            start_date: recurrence.start_date.or(Some(first_due)),
            interval: recurrence.interval.max(1),
            ..recurrence
        };
        Self {
            deadline: Some(first_due),
            recurrence: Some(recurrence),
            ..Self::new(text, created_at)
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn is_root(&self) -> bool {
        matches!(self.link, RecurrenceLink::Root)
    }

    /// Identifier the missed ledger is keyed by.
    pub fn root_id(&self) -> &str {
        match &self.link {
            RecurrenceLink::Root => &self.id,
            RecurrenceLink::Occurrence { root_id } => root_id,
        }
    }

    /// Category name used for grouping in reports.
    pub fn category_or_default(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("uncategorized")
    }

    /// Whole days past the deadline, if the task is open and overdue.
    pub fn days_overdue(&self, today: NaiveDate) -> Option<i64> {
        if self.done {
            return None;
        }
        let deadline = self.deadline?;
        (deadline < today).then(|| (today - deadline).num_days())
    }
}
