//! Missed-task triage.
//!
//! Three independent lists: open tasks past their deadline, open tasks nobody
//! has touched, and recurring habits whose last completion is older than one
//! pattern window.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::habit::{Priority, RecurrenceLink, Task};
use crate::storage::{CadenceDb, TriageConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueTask {
    pub id: String,
    pub text: String,
    pub category: String,
    pub priority: Priority,
    pub deadline: NaiveDate,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeverStartedTask {
    pub id: String,
    pub text: String,
    pub category: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub days_since_created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecurring {
    pub id: String,
    pub text: String,
    pub pattern: String,
    /// Falls back to the creation date when the habit was never completed
    pub last_completed: NaiveDate,
    pub days_since_last_completion: i64,
    pub window_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedTasksSummary {
    pub total_overdue: usize,
    pub total_never_started: usize,
    pub total_skipped_recurring: usize,
    /// High-priority overdue tasks
    pub critical_missed: usize,
    pub total_missed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedTasksAnalysis {
    /// Most overdue first
    pub overdue_tasks: Vec<OverdueTask>,
    /// Oldest first
    pub never_started_tasks: Vec<NeverStartedTask>,
    pub skipped_recurring: Vec<SkippedRecurring>,
    pub summary: MissedTasksSummary,
}

/// Classifies open work into the three triage lists.
#[derive(Debug, Clone, Copy)]
pub struct MissedTaskAnalyzer {
    pub never_started_after_days: i64,
}

impl Default for MissedTaskAnalyzer {
    fn default() -> Self {
        Self::from_config(&TriageConfig::default())
    }
}

impl MissedTaskAnalyzer {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            never_started_after_days: config.never_started_after_days,
        }
    }

    fn overdue(tasks: &[Task], today: NaiveDate) -> Vec<OverdueTask> {
        let mut overdue: Vec<OverdueTask> = tasks
            .iter()
            .filter(|t| !(t.is_recurring() && t.is_root()))
            .filter_map(|t| {
                let days_overdue = t.days_overdue(today)?;
                Some(OverdueTask {
                    id: t.id.clone(),
                    text: t.text.clone(),
                    category: t.category_or_default().to_string(),
                    priority: t.priority,
                    deadline: t.deadline?,
                    days_overdue,
                })
            })
            .collect();
        overdue.sort_by(|a, b| {
            b.days_overdue
                .cmp(&a.days_overdue)
                .then_with(|| a.id.cmp(&b.id))
        });
        overdue
    }

    fn never_started(&self, tasks: &[Task], now: DateTime<Utc>) -> Vec<NeverStartedTask> {
        let mut stale: Vec<NeverStartedTask> = tasks
            .iter()
            .filter(|t| !t.done && t.time_logged_minutes == 0)
            .filter(|t| !(t.is_recurring() && t.is_root()))
            .filter_map(|t| {
                let age = (now - t.created_at).num_days();
                (age > self.never_started_after_days).then(|| NeverStartedTask {
                    id: t.id.clone(),
                    text: t.text.clone(),
                    category: t.category_or_default().to_string(),
                    priority: t.priority,
                    created_at: t.created_at,
                    days_since_created: age,
                })
            })
            .collect();
        stale.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        stale
    }

    fn skipped_recurring(tasks: &[Task], today: NaiveDate) -> Vec<SkippedRecurring> {
        // Latest completed occurrence per root id.
        let mut latest: HashMap<&str, NaiveDate> = HashMap::new();
        for task in tasks {
            let RecurrenceLink::Occurrence { root_id } = &task.link else {
                continue;
            };
            if let Some(at) = task.completed_at.filter(|_| task.done) {
                let date = at.date_naive();
                latest
                    .entry(root_id.as_str())
                    .and_modify(|d| *d = (*d).max(date))
                    .or_insert(date);
            }
        }

        tasks
            .iter()
            .filter(|t| t.is_root() && !t.done)
            .filter_map(|t| {
                let recurrence = t.recurrence.as_ref()?;
                let window_days = recurrence
                    .pattern
                    .map_or(1, |p| p.window_days(recurrence.interval));
                let last_completed = [
                    t.counters.last_completed_date,
                    latest.get(t.id.as_str()).copied(),
                ]
                .into_iter()
                .flatten()
                .max()
                .unwrap_or_else(|| t.created_at.date_naive());
                let days_since = (today - last_completed).num_days();

                (days_since > window_days).then(|| SkippedRecurring {
                    id: t.id.clone(),
                    text: t.text.clone(),
                    pattern: recurrence.pattern_label().to_string(),
                    last_completed,
                    days_since_last_completion: days_since,
                    window_days,
                })
            })
            .collect()
    }

    pub fn analyze(&self, tasks: &[Task], now: DateTime<Utc>) -> MissedTasksAnalysis {
        let today = now.date_naive();
        let overdue_tasks = Self::overdue(tasks, today);
        let never_started_tasks = self.never_started(tasks, now);
        let skipped_recurring = Self::skipped_recurring(tasks, today);

        let summary = MissedTasksSummary {
            total_overdue: overdue_tasks.len(),
            total_never_started: never_started_tasks.len(),
            total_skipped_recurring: skipped_recurring.len(),
            critical_missed: overdue_tasks
                .iter()
                .filter(|t| t.priority == Priority::High)
                .count(),
            total_missed: overdue_tasks.len() + never_started_tasks.len() + skipped_recurring.len(),
        };

        MissedTasksAnalysis {
            overdue_tasks,
            never_started_tasks,
            skipped_recurring,
            summary,
        }
    }
}

/// Missed-task triage over the whole store.
pub fn get_missed_tasks_analysis(
    db: &CadenceDb,
    now: DateTime<Utc>,
    config: &TriageConfig,
) -> Result<MissedTasksAnalysis> {
    let tasks = db.list_tasks()?;
    Ok(MissedTaskAnalyzer::from_config(config).analyze(&tasks, now))
}
