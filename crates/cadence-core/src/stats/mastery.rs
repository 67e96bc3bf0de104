//! Per-category mastery scores.
//!
//! mastery = 0.5 × completion rate + 0.3 × consistency + 0.2 × high-priority ratio

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{percent, Period};
use crate::error::Result;
use crate::habit::{Priority, Task};
use crate::storage::CadenceDb;

/// Direction of completions between the two halves of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    /// `Improving` above +20%, `Declining` below -20%, else `Stable`.
    pub fn from_halves(first_half: usize, second_half: usize) -> Self {
        let first = first_half as f64;
        let second = second_half as f64;
        if second > first * 1.2 {
            Trend::Improving
        } else if second < first * 0.8 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryStats {
    pub category: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: f64,
    /// Distinct days with a completion over period length (0-100)
    pub consistency_score: f64,
    /// Completion rate of high-priority tasks (0-100)
    pub high_priority_ratio: f64,
    /// 0-100
    pub mastery_score: u32,
    pub trend: Trend,
    pub first_half_completions: usize,
    pub second_half_completions: usize,
}

/// Computes [`MasteryStats`] for a period ending at `now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MasteryAnalyzer {
    pub period: Period,
}

impl MasteryAnalyzer {
    pub fn new(period: Period) -> Self {
        Self { period }
    }

    /// Blend the three components into a 0-100 score.
    ///
    /// Only a category perfect on all three components scores 100.
    pub fn mastery_score(completion_rate: f64, consistency: f64, high_priority_ratio: f64) -> u32 {
        let raw = (completion_rate * 5.0 + consistency * 3.0 + high_priority_ratio * 2.0) / 10.0;
        let score = raw.round().clamp(0.0, 100.0) as u32;
        let perfect =
            completion_rate >= 100.0 && consistency >= 100.0 && high_priority_ratio >= 100.0;
        if perfect {
            100
        } else {
            score.min(99)
        }
    }

    /// Whether `task` belongs to the period's population.
    ///
    /// Recurring roots are schedule definitions, not work items, and are left out;
    /// their completed occurrences are counted instead.
    fn in_period(&self, task: &Task, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if task.is_recurring() && task.is_root() {
            return false;
        }
        let created = task.created_at >= start && task.created_at <= now;
        let completed = task
            .completed_at
            .is_some_and(|at| at >= start && at <= now);
        created || completed
    }

    pub fn analyze(&self, tasks: &[Task], now: DateTime<Utc>) -> Vec<MasteryStats> {
        let start = self.period.start(now);
        let midpoint = self.period.midpoint(now);

        let mut by_category: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in tasks.iter().filter(|t| self.in_period(t, start, now)) {
            by_category
                .entry(task.category_or_default())
                .or_default()
                .push(task);
        }

        let mut stats: Vec<MasteryStats> = by_category
            .into_iter()
            .map(|(category, tasks)| self.category_stats(category, &tasks, start, midpoint, now))
            .collect();

        stats.sort_by(|a, b| {
            b.mastery_score
                .cmp(&a.mastery_score)
                .then_with(|| a.category.cmp(&b.category))
        });
        stats
    }

    fn category_stats(
        &self,
        category: &str,
        tasks: &[&Task],
        start: DateTime<Utc>,
        midpoint: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> MasteryStats {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.done).count();
        let completion_rate = percent(completed, total);

        let completion_times: Vec<DateTime<Utc>> = tasks
            .iter()
            .filter(|t| t.done)
            .filter_map(|t| t.completed_at)
            .filter(|at| *at >= start && *at <= now)
            .collect();

        let active_days: BTreeSet<NaiveDate> =
            completion_times.iter().map(|at| at.date_naive()).collect();
        let consistency_score =
            (active_days.len() as f64 / self.period.days() as f64 * 100.0).min(100.0);

        let high: Vec<&&Task> = tasks.iter().filter(|t| t.priority == Priority::High).collect();
        let high_priority_ratio = if high.is_empty() {
            completion_rate
        } else {
            percent(high.iter().filter(|t| t.done).count(), high.len())
        };

        let first_half = completion_times.iter().filter(|at| **at < midpoint).count();
        let second_half = completion_times.len() - first_half;

        MasteryStats {
            category: category.to_string(),
            total_tasks: total,
            completed_tasks: completed,
            completion_rate,
            consistency_score,
            high_priority_ratio,
            mastery_score: Self::mastery_score(
                completion_rate,
                consistency_score,
                high_priority_ratio,
            ),
            trend: Trend::from_halves(first_half, second_half),
            first_half_completions: first_half,
            second_half_completions: second_half,
        }
    }
}

/// Mastery per category over `period`, best first.
pub fn get_task_mastery_stats(
    db: &CadenceDb,
    period: Period,
    now: DateTime<Utc>,
) -> Result<Vec<MasteryStats>> {
    let tasks = db.list_tasks()?;
    Ok(MasteryAnalyzer::new(period).analyze(&tasks, now))
}
