//! Task and habit commands for CLI.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;

use cadence_core::{CadenceDb, Priority, Recurrence, RecurrencePattern, Task};

use super::common::{parse_date_arg, print_json};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task, or a habit when --pattern is given
    Add {
        /// Task text
        text: String,
        /// Category used for grouping in reports
        #[arg(long)]
        category: Option<String>,
        /// high, medium or low
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD); for a habit this is the first due date
        #[arg(long, value_parser = parse_date_arg)]
        deadline: Option<NaiveDate>,
        /// daily, weekly, monthly or custom
        #[arg(long)]
        pattern: Option<RecurrencePattern>,
        /// Days between repetitions for a custom pattern
        #[arg(long, default_value = "1")]
        interval: u32,
        /// Comma-separated weekdays for a weekly pattern (Sunday = 0)
        #[arg(long)]
        days: Option<String>,
    },
    /// List tasks
    List {
        /// Only recurring habit roots
        #[arg(long)]
        habits: bool,
        /// Hide completed tasks
        #[arg(long)]
        open: bool,
    },
    /// Get task details
    Get {
        /// Task ID
        id: String,
    },
    /// Complete a task, or the due occurrence of a habit
    Complete {
        /// Task ID
        id: String,
    },
    /// Add worked minutes to a task
    Log {
        /// Task ID
        id: String,
        /// Minutes worked
        minutes: u64,
    },
}

fn parse_days(raw: &str) -> Result<BTreeSet<u8>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u8>() {
            Ok(day) if day <= 6 => Ok(day),
            _ => Err(format!("invalid weekday '{s}' (expected 0-6, Sunday = 0)")),
        })
        .collect()
}

pub fn run(action: TaskAction, now: DateTime<Utc>) -> Result<(), Box<dyn std::error::Error>> {
    let db = CadenceDb::open()?;

    match action {
        TaskAction::Add {
            text,
            category,
            priority,
            deadline,
            pattern,
            interval,
            days,
        } => {
            let mut task = match pattern {
                Some(pattern) => {
                    let recurrence = Recurrence {
                        interval,
                        days: days.as_deref().map(parse_days).transpose()?.unwrap_or_default(),
                        ..Recurrence::new(pattern)
                    };
                    let first_due = deadline.unwrap_or_else(|| now.date_naive());
                    Task::new_habit(text, recurrence, first_due, now)
                }
                None => Task {
                    deadline,
                    ..Task::new(text, now)
                },
            };
            task.category = category;
            task.priority = priority;
            db.insert_task(&task)?;
            tracing::info!(task_id = %task.id, recurring = task.is_recurring(), "task created");
            print_json(&task)?;
        }
        TaskAction::List { habits, open } => {
            let tasks: Vec<Task> = db
                .list_tasks()?
                .into_iter()
                .filter(|t| !habits || (t.is_recurring() && t.is_root()))
                .filter(|t| !open || !t.done)
                .collect();
            print_json(&tasks)?;
        }
        TaskAction::Get { id } => {
            let task = db.get_task(&id)?.ok_or(format!("Task not found: {id}"))?;
            print_json(&task)?;
        }
        TaskAction::Complete { id } => {
            let task = db
                .record_completion(&id, now)?
                .ok_or(format!("Task not found: {id}"))?;
            print_json(&task)?;
        }
        TaskAction::Log { id, minutes } => {
            if !db.log_time(&id, minutes)? {
                return Err(format!("Task not found: {id}").into());
            }
            let task = db.get_task(&id)?.ok_or(format!("Task not found: {id}"))?;
            print_json(&task)?;
        }
    }
    Ok(())
}
