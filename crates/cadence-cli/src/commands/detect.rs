use chrono::{DateTime, Utc};
use clap::Subcommand;

use cadence_core::{check_all_missed_recurring, detect_and_log_missed, CadenceDb};

use super::common::print_json;

#[derive(Subcommand)]
pub enum DetectAction {
    /// Detect misses for one habit (an occurrence ID resolves to its habit)
    Run {
        /// Habit ID
        id: String,
    },
    /// Detect misses for every open habit
    Sweep,
}

pub fn run(action: DetectAction, now: DateTime<Utc>) -> Result<(), Box<dyn std::error::Error>> {
    let db = CadenceDb::open()?;

    match action {
        DetectAction::Run { id } => {
            let outcome = detect_and_log_missed(&db, &id, now)?;
            print_json(&outcome)?;
        }
        DetectAction::Sweep => {
            let summary = check_all_missed_recurring(&db, now)?;
            print_json(&summary)?;
        }
    }
    Ok(())
}
