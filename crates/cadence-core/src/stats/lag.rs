//! Lag indicators: how much overdue burden each category and priority carries.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{percent, Period};
use crate::error::Result;
use crate::habit::{Priority, Task};
use crate::storage::CadenceDb;

/// Overdue severity for one group of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagIndicator {
    /// Category name or priority level
    pub name: String,
    pub total_tasks: usize,
    pub overdue_count: usize,
    /// 0.0 to 1.0
    pub overdue_ratio: f64,
    pub avg_days_overdue: f64,
    /// 0-100
    pub completion_rate: f64,
    /// 0-100
    pub lag_score: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LagReport {
    /// Worst first
    pub lag_categories: Vec<LagIndicator>,
    /// High, medium, low
    pub lag_priorities: Vec<LagIndicator>,
    /// Unweighted mean of the category scores
    pub overall_lag_score: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LagAnalyzer {
    pub period: Period,
}

impl LagAnalyzer {
    pub fn new(period: Period) -> Self {
        Self { period }
    }

    /// `overdue_ratio·40 + (1 − completion/100)·40 + min(avg_days/30, 1)·20`, capped at 100.
    pub fn lag_score(overdue_ratio: f64, completion_rate: f64, avg_days_overdue: f64) -> u32 {
        let raw = overdue_ratio * 40.0
            + (1.0 - completion_rate / 100.0) * 40.0
            + (avg_days_overdue / 30.0).min(1.0) * 20.0;
        raw.round().clamp(0.0, 100.0) as u32
    }

    /// Tasks created in the period, plus older ones still open past their deadline.
    fn in_scope(&self, task: &Task, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if task.is_recurring() && task.is_root() {
            return false;
        }
        let created = task.created_at >= start && task.created_at <= now;
        created || task.days_overdue(now.date_naive()).is_some()
    }

    fn indicator(name: &str, tasks: &[&Task], today: NaiveDate) -> LagIndicator {
        let total = tasks.len();
        let overdue: Vec<i64> = tasks.iter().filter_map(|t| t.days_overdue(today)).collect();
        let completed = tasks.iter().filter(|t| t.done).count();

        let overdue_ratio = if total == 0 {
            0.0
        } else {
            overdue.len() as f64 / total as f64
        };
        let avg_days_overdue = if overdue.is_empty() {
            0.0
        } else {
            overdue.iter().sum::<i64>() as f64 / overdue.len() as f64
        };
        let completion_rate = percent(completed, total);

        LagIndicator {
            name: name.to_string(),
            total_tasks: total,
            overdue_count: overdue.len(),
            overdue_ratio,
            avg_days_overdue,
            completion_rate,
            lag_score: Self::lag_score(overdue_ratio, completion_rate, avg_days_overdue),
        }
    }

    pub fn analyze(&self, tasks: &[Task], now: DateTime<Utc>) -> LagReport {
        let start = self.period.start(now);
        let today = now.date_naive();
        let scoped: Vec<&Task> = tasks.iter().filter(|t| self.in_scope(t, start, now)).collect();

        let mut by_category: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for &task in &scoped {
            by_category
                .entry(task.category_or_default())
                .or_default()
                .push(task);
        }

        let mut lag_categories: Vec<LagIndicator> = by_category
            .iter()
            .map(|(name, tasks)| Self::indicator(name, tasks, today))
            .collect();
        lag_categories.sort_by(|a, b| {
            b.lag_score
                .cmp(&a.lag_score)
                .then_with(|| a.name.cmp(&b.name))
        });

        let lag_priorities: Vec<LagIndicator> = Priority::ALL
            .iter()
            .filter_map(|priority| {
                let group: Vec<&Task> = scoped
                    .iter()
                    .copied()
                    .filter(|t| t.priority == *priority)
                    .collect();
                (!group.is_empty()).then(|| Self::indicator(priority.as_str(), &group, today))
            })
            .collect();

        let overall_lag_score = if lag_categories.is_empty() {
            0
        } else {
            let sum: u32 = lag_categories.iter().map(|c| c.lag_score).sum();
            (f64::from(sum) / lag_categories.len() as f64).round() as u32
        };

        LagReport {
            lag_categories,
            lag_priorities,
            overall_lag_score,
        }
    }
}

/// Lag indicators over `period`.
pub fn get_lag_indicators(db: &CadenceDb, period: Period, now: DateTime<Utc>) -> Result<LagReport> {
    let tasks = db.list_tasks()?;
    Ok(LagAnalyzer::new(period).analyze(&tasks, now))
}
