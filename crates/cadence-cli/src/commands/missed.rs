use chrono::NaiveDate;
use clap::Subcommand;

use cadence_core::{CadenceDb, DateRange};

use super::common::{parse_date_arg, print_json};

#[derive(Subcommand)]
pub enum MissedAction {
    /// Ledger entries for one habit, most recent first
    Logs {
        /// Habit ID
        root_id: String,
        /// Earliest missed date (inclusive)
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        /// Latest missed date (inclusive)
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
        /// Maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Ledger entries for every habit, most recent first
    All {
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
    },
}

pub fn run(action: MissedAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = CadenceDb::open()?;

    match action {
        MissedAction::Logs {
            root_id,
            from,
            to,
            limit,
        } => {
            let logs = db.missed_logs(&root_id, DateRange::new(from, to), limit)?;
            print_json(&logs)?;
        }
        MissedAction::All { from, to } => {
            let logs = db.all_missed_logs(DateRange::new(from, to))?;
            print_json(&logs)?;
        }
    }
    Ok(())
}
