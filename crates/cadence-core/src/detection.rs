//! Missed-occurrence detection.
//!
//! For one habit: enumerate every scheduled date in `[deadline, today)`,
//! append the ones the ledger does not yet hold, advance the cursor to today
//! or later and patch the habit's counters. The read-modify-write runs in one
//! `BEGIN IMMEDIATE` transaction, so two detection runs on the same database
//! serialise and the second sees the first one's ledger rows and cursor.
//!
//! Re-running detection without the clock moving inserts nothing and leaves
//! the habit unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::habit::{RecurrenceLink, Task};
use crate::ledger::{self, AppendOutcome};
use crate::schedule::{advance, missed_dates};
use crate::storage::{CadenceDb, DetectionPatch};

/// Result of detecting misses for one habit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Ledger entries inserted by this run
    pub missed_count: u32,
    /// Cursor after this run; `None` when the habit does not participate
    pub new_deadline: Option<NaiveDate>,
    /// Dates inserted by this run, oldest first
    pub missed_dates: Vec<NaiveDate>,
    /// The deadline had elapsed and the habit was patched
    pub applied: bool,
    /// The pattern could not reach today; the cursor is still in the past
    pub stalled: bool,
}

impl DetectionOutcome {
    fn not_applicable() -> Self {
        Self::default()
    }

    fn current(deadline: NaiveDate) -> Self {
        Self {
            new_deadline: Some(deadline),
            ..Self::default()
        }
    }
}

/// A habit the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub habit_id: String,
    pub error: String,
}

/// Aggregate result of [`check_all_missed_recurring`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Candidates examined
    pub checked: usize,
    /// Candidates whose deadline had elapsed and were updated
    pub processed: usize,
    pub total_new_misses: u32,
    /// Habits left with a cursor in the past
    pub stalled: Vec<String>,
    pub failures: Vec<SweepFailure>,
}

enum Resolved {
    Skip,
    Current(NaiveDate),
    Stale(Task),
}

/// Load the habit detection should run on, following an occurrence to its root.
fn resolve(conn: &Connection, habit_id: &str, today: NaiveDate) -> Result<Resolved> {
    let Some(task) = CadenceDb::get_task_in(conn, habit_id)? else {
        tracing::debug!(habit_id, "habit not found; nothing to detect");
        return Ok(Resolved::Skip);
    };

    let habit = match &task.link {
        RecurrenceLink::Root => task,
        RecurrenceLink::Occurrence { root_id } => {
            match CadenceDb::get_task_in(conn, root_id)? {
                Some(root) if root.is_root() => root,
                _ => {
                    tracing::debug!(
                        habit_id,
                        root_id = %root_id,
                        "occurrence has no root; skipping"
                    );
                    return Ok(Resolved::Skip);
                }
            }
        }
    };

    if !habit.is_recurring() || habit.done {
        return Ok(Resolved::Skip);
    }
    match habit.deadline {
        None => Ok(Resolved::Skip),
        Some(deadline) if deadline >= today => Ok(Resolved::Current(deadline)),
        Some(_) => Ok(Resolved::Stale(habit)),
    }
}

/// Log every elapsed scheduled date of a stale `habit` and advance its cursor.
///
/// Runs on the caller's connection so it joins the caller's transaction.
pub(crate) fn resolve_elapsed(
    conn: &Connection,
    habit: &Task,
    now: DateTime<Utc>,
) -> Result<DetectionOutcome> {
    let today = now.date_naive();
    let (Some(recurrence), Some(deadline)) = (habit.recurrence.as_ref(), habit.deadline) else {
        return Ok(DetectionOutcome::not_applicable());
    };
    let root_id = habit.root_id();

    let recorded = ledger::recorded_dates(conn, root_id)?;
    let mut inserted = Vec::new();
    for date in missed_dates(recurrence, deadline, today) {
        if recorded.contains(&date) {
            continue;
        }
        let outcome = ledger::append(
            conn,
            root_id,
            date,
            recurrence.pattern_label(),
            &habit.text,
            now,
        )?;
        if outcome == AppendOutcome::Inserted {
            inserted.push(date);
        }
    }

    let advanced = advance(recurrence, deadline, today);
    let new_misses = u32::try_from(inserted.len()).unwrap_or(u32::MAX);
    CadenceDb::apply_detection_patch(
        conn,
        &habit.id,
        &DetectionPatch {
            deadline: advanced.deadline,
            new_misses,
        },
    )?;

    tracing::debug!(
        habit_id = %habit.id,
        from = %deadline,
        new_deadline = %advanced.deadline,
        new_misses,
        "detection applied"
    );

    Ok(DetectionOutcome {
        missed_count: new_misses,
        new_deadline: Some(advanced.deadline),
        missed_dates: inserted,
        applied: true,
        stalled: advanced.stalled,
    })
}

/// Detect and log missed occurrences for one habit.
///
/// Missing, non-recurring, completed or undated habits yield a zero outcome.
/// An occurrence id is resolved to its root habit.
///
/// # Errors
/// Returns an error only when the store fails.
pub fn detect_and_log_missed(
    db: &CadenceDb,
    habit_id: &str,
    now: DateTime<Utc>,
) -> Result<DetectionOutcome> {
    let today = now.date_naive();

    // Unlocked read first so repeated calls on a current habit stay cheap.
    match resolve(db.conn(), habit_id, today)? {
        Resolved::Skip => return Ok(DetectionOutcome::not_applicable()),
        Resolved::Current(deadline) => return Ok(DetectionOutcome::current(deadline)),
        Resolved::Stale(_) => {}
    }

    let tx = db.begin_immediate()?;
    // Another run may have committed between the unlocked read and the lock.
    let outcome = match resolve(&tx, habit_id, today)? {
        Resolved::Skip => DetectionOutcome::not_applicable(),
        Resolved::Current(deadline) => DetectionOutcome::current(deadline),
        Resolved::Stale(habit) => resolve_elapsed(&tx, &habit, now)?,
    };
    tx.commit()?;
    Ok(outcome)
}

/// Run detection for every open recurring root habit.
///
/// Each habit is its own transaction; a failure is logged and recorded in
/// the summary and the sweep moves on.
///
/// # Errors
/// Returns an error only if the candidate list cannot be read.
pub fn check_all_missed_recurring(db: &CadenceDb, now: DateTime<Utc>) -> Result<SweepSummary> {
    let candidates = db.list_detection_candidates()?;
    let mut summary = SweepSummary {
        checked: candidates.len(),
        ..SweepSummary::default()
    };

    for habit_id in candidates {
        match detect_and_log_missed(db, &habit_id, now) {
            Ok(outcome) => {
                if outcome.applied {
                    summary.processed += 1;
                    summary.total_new_misses += outcome.missed_count;
                }
                if outcome.stalled {
                    summary.stalled.push(habit_id);
                }
            }
            Err(e) => {
                tracing::error!(habit_id = %habit_id, error = %e, "missed detection failed");
                summary.failures.push(SweepFailure {
                    habit_id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        checked = summary.checked,
        processed = summary.processed,
        total_new_misses = summary.total_new_misses,
        failures = summary.failures.len(),
        "missed detection sweep finished"
    );
    Ok(summary)
}
