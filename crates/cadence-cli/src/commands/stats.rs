use chrono::{DateTime, Utc};
use clap::Subcommand;

use cadence_core::stats::{
    get_all_recurring_stats, get_lag_indicators, get_missed_tasks_analysis,
    get_recurring_stats, get_task_mastery_stats,
};
use cadence_core::{CadenceDb, Config, Period};

use super::common::print_json;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Compliance stats for one habit
    Habit {
        /// Habit ID
        root_id: String,
    },
    /// Compliance stats for every habit, worst first
    Habits,
    /// Mastery score per category
    Mastery {
        /// week, month or quarter (default from config)
        #[arg(long)]
        period: Option<Period>,
    },
    /// Lag indicators per category and priority
    Lag {
        /// week, month or quarter (default from config)
        #[arg(long)]
        period: Option<Period>,
    },
    /// Overdue, never-started and skipped-recurring tasks
    Triage,
}

pub fn run(action: StatsAction, now: DateTime<Utc>) -> Result<(), Box<dyn std::error::Error>> {
    let db = CadenceDb::open()?;
    let config = Config::load()?;

    match action {
        StatsAction::Habit { root_id } => {
            let stats = get_recurring_stats(&db, &root_id, now, &config.analytics)?
                .ok_or(format!("Not a recurring habit: {root_id}"))?;
            print_json(&stats)?;
        }
        StatsAction::Habits => {
            let stats = get_all_recurring_stats(&db, now, &config.analytics)?;
            print_json(&stats)?;
        }
        StatsAction::Mastery { period } => {
            let period = period.unwrap_or(config.analytics.default_period);
            print_json(&get_task_mastery_stats(&db, period, now)?)?;
        }
        StatsAction::Lag { period } => {
            let period = period.unwrap_or(config.analytics.default_period);
            print_json(&get_lag_indicators(&db, period, now)?)?;
        }
        StatsAction::Triage => {
            print_json(&get_missed_tasks_analysis(&db, now, &config.triage)?)?;
        }
    }
    Ok(())
}
