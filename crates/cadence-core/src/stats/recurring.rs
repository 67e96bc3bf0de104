//! Per-habit compliance statistics.
//!
//! History days are classified without a per-occurrence completion log:
//! a day inside the habit's active range that has no ledger entry counts as
//! completed. This is an approximation; weekly and monthly habits report
//! unscheduled days as completed too.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::habit::Task;
use crate::ledger::{DateRange, MissedLogEntry};
use crate::schedule::calendar::add_days;
use crate::storage::{AnalyticsConfig, CadenceDb};

/// Classification of one day in a habit's history strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Completed,
    Missed,
    /// Outside the habit's active range
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// Compliance snapshot for one root habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringStats {
    pub habit_id: String,
    pub text: String,
    pub pattern: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_missed: u32,
    pub total_completed: u32,
    /// Percentage of resolved occurrences that were completed (0-100)
    pub completion_rate: f64,
    /// Oldest first, ending today
    pub history: Vec<HistoryDay>,
    /// Most recent first
    pub missed_logs: Vec<MissedLogEntry>,
}

/// Builds [`RecurringStats`] from a habit and its ledger entries.
#[derive(Debug, Clone)]
pub struct RecurringStatsAnalyzer {
    pub history_days: u32,
    pub missed_logs_limit: usize,
}

impl Default for RecurringStatsAnalyzer {
    fn default() -> Self {
        Self::from_config(&AnalyticsConfig::default())
    }
}

impl RecurringStatsAnalyzer {
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self {
            history_days: config.history_days.max(1),
            missed_logs_limit: config.missed_logs_in_stats,
        }
    }

    /// First day shown in the history strip.
    pub fn history_start(&self, today: NaiveDate) -> NaiveDate {
        add_days(today, -(i64::from(self.history_days) - 1))
    }

    /// `total_completed / (total_completed + total_missed) * 100`, 0 when both are 0.
    pub fn completion_rate(total_completed: u32, total_missed: u32) -> f64 {
        let resolved = u64::from(total_completed) + u64::from(total_missed);
        if resolved == 0 {
            0.0
        } else {
            f64::from(total_completed) / resolved as f64 * 100.0
        }
    }

    /// Classify each day from `history_start(today)` through `today`.
    pub fn history(
        &self,
        habit: &Task,
        missed: &BTreeSet<NaiveDate>,
        today: NaiveDate,
    ) -> Vec<HistoryDay> {
        let active_from = habit
            .recurrence
            .as_ref()
            .and_then(|r| r.start_date)
            .unwrap_or_else(|| habit.created_at.date_naive());

        let start = self.history_start(today);
        (0..i64::from(self.history_days))
            .map(|offset| {
                let date = add_days(start, offset);
                let status = if missed.contains(&date) {
                    DayStatus::Missed
                } else if date >= active_from && date < today {
                    DayStatus::Completed
                } else {
                    DayStatus::None
                };
                HistoryDay { date, status }
            })
            .collect()
    }

    /// Build stats for `habit` from ledger entries (most recent first).
    pub fn analyze(
        &self,
        habit: &Task,
        logs: &[MissedLogEntry],
        today: NaiveDate,
    ) -> RecurringStats {
        let missed: BTreeSet<NaiveDate> = logs.iter().map(|l| l.missed_date).collect();
        let counters = &habit.counters;
        RecurringStats {
            habit_id: habit.id.clone(),
            text: habit.text.clone(),
            pattern: habit
                .recurrence
                .as_ref()
                .map_or("unknown", |r| r.pattern_label())
                .to_string(),
            current_streak: counters.current_streak,
            longest_streak: counters.longest_streak,
            total_missed: counters.total_missed,
            total_completed: counters.total_completed,
            completion_rate: Self::completion_rate(counters.total_completed, counters.total_missed),
            history: self.history(habit, &missed, today),
            missed_logs: logs.iter().take(self.missed_logs_limit).cloned().collect(),
        }
    }
}

fn is_recurring_root(task: &Task) -> bool {
    task.is_recurring() && task.is_root()
}

fn stats_for(
    db: &CadenceDb,
    analyzer: &RecurringStatsAnalyzer,
    habit: &Task,
    today: NaiveDate,
) -> Result<RecurringStats> {
    let mut logs = db.missed_logs(&habit.id, DateRange::default(), None)?;
    // History needs every miss in the strip even if the attached list is short.
    logs.retain(|l| l.missed_date <= today);
    Ok(analyzer.analyze(habit, &logs, today))
}

/// Stats for one root habit; `None` if it does not exist or is not a recurring root.
pub fn get_recurring_stats(
    db: &CadenceDb,
    root_id: &str,
    now: DateTime<Utc>,
    config: &AnalyticsConfig,
) -> Result<Option<RecurringStats>> {
    let Some(habit) = db.get_task(root_id)?.filter(is_recurring_root) else {
        return Ok(None);
    };
    let analyzer = RecurringStatsAnalyzer::from_config(config);
    stats_for(db, &analyzer, &habit, now.date_naive()).map(Some)
}

/// Stats for every root habit, worst completion rate first.
pub fn get_all_recurring_stats(
    db: &CadenceDb,
    now: DateTime<Utc>,
    config: &AnalyticsConfig,
) -> Result<Vec<RecurringStats>> {
    let analyzer = RecurringStatsAnalyzer::from_config(config);
    let today = now.date_naive();
    let mut all = Vec::new();
    for habit in db.list_tasks()?.iter().filter(|t| is_recurring_root(t)) {
        all.push(stats_for(db, &analyzer, habit, today)?);
    }
    all.sort_by(|a, b| {
        a.completion_rate
            .partial_cmp(&b.completion_rate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.text.cmp(&b.text))
    });
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::Recurrence;
    use crate::schedule::calendar::{parse_date, RecurrencePattern};

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{date}T12:00:00+00:00"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn log(date: &str) -> MissedLogEntry {
        MissedLogEntry {
            id: 0,
            recurring_root_id: "h".into(),
            missed_date: d(date),
            pattern: "daily".into(),
            task_text: "Read".into(),
            logged_at: at(date),
        }
    }

    #[test]
    fn completion_rate_edges() {
        assert_eq!(RecurringStatsAnalyzer::completion_rate(0, 0), 0.0);
        assert_eq!(RecurringStatsAnalyzer::completion_rate(3, 1), 75.0);
        assert_eq!(RecurringStatsAnalyzer::completion_rate(0, 5), 0.0);
    }

    #[test]
    fn history_classifies_active_range() {
        let analyzer = RecurringStatsAnalyzer {
            history_days: 5,
            missed_logs_limit: 10,
        };
        let habit = Task::new_habit(
            "Read",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-08"),
            at("2024-01-01"),
        );
        let missed: BTreeSet<NaiveDate> = [d("2024-01-09")].into_iter().collect();

        let history = analyzer.history(&habit, &missed, d("2024-01-11"));
        let statuses: Vec<_> = history.iter().map(|h| (h.date, h.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (d("2024-01-07"), DayStatus::None),
                (d("2024-01-08"), DayStatus::Completed),
                (d("2024-01-09"), DayStatus::Missed),
                (d("2024-01-10"), DayStatus::Completed),
                (d("2024-01-11"), DayStatus::None),
            ]
        );
    }

    #[test]
    fn analyze_limits_attached_logs() {
        let analyzer = RecurringStatsAnalyzer {
            history_days: 30,
            missed_logs_limit: 1,
        };
        let mut habit = Task::new_habit(
            "Read",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        habit.counters.total_completed = 8;
        habit.counters.total_missed = 2;
        let logs = vec![log("2024-01-05"), log("2024-01-03")];

        let stats = analyzer.analyze(&habit, &logs, d("2024-01-10"));
        assert_eq!(stats.completion_rate, 80.0);
        assert_eq!(stats.history.len(), 30);
        assert_eq!(stats.missed_logs.len(), 1);
        let missed_days = stats.history.iter().filter(|h| h.status == DayStatus::Missed).count();
        assert_eq!(missed_days, 2);
        assert_eq!(stats.pattern, "daily");
    }

    #[test]
    fn get_recurring_stats_ignores_non_roots() {
        let db = CadenceDb::open_memory().unwrap();
        let one_off = Task::new("Email", at("2024-01-01"));
        db.insert_task(&one_off).unwrap();
        let cfg = AnalyticsConfig::default();
        assert!(get_recurring_stats(&db, &one_off.id, at("2024-01-02"), &cfg).unwrap().is_none());
        assert!(get_recurring_stats(&db, "missing", at("2024-01-02"), &cfg).unwrap().is_none());
    }

    #[test]
    fn all_stats_sorted_worst_first() {
        let db = CadenceDb::open_memory().unwrap();
        let mut good = Task::new_habit(
            "Good",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        good.counters.total_completed = 9;
        good.counters.total_missed = 1;
        let mut bad = Task::new_habit(
            "Bad",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        bad.counters.total_completed = 1;
        bad.counters.total_missed = 9;
        db.insert_task(&good).unwrap();
        db.insert_task(&bad).unwrap();
        db.insert_task(&Task::new("One-off", at("2024-01-01"))).unwrap();

        let all = get_all_recurring_stats(&db, at("2024-01-10"), &AnalyticsConfig::default())
            .unwrap();
        let names: Vec<_> = all.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(names, vec!["Bad", "Good"]);
    }

    #[test]
    fn empty_store_yields_empty_report() {
        let db = CadenceDb::open_memory().unwrap();
        let all = get_all_recurring_stats(&db, at("2024-01-10"), &AnalyticsConfig::default())
            .unwrap();
        assert!(all.is_empty());
    }
}
