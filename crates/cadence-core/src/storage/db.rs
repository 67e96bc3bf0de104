//! SQLite-based storage for tasks, habits and the missed-occurrence ledger.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::data_dir;
use super::migrations;
use crate::detection;
use crate::error::{DatabaseError, Result, ValidationError};
use crate::habit::{HabitCounters, Recurrence, RecurrenceLink, Task};
use crate::ledger::{self, conversion_error, DateRange, MissedLogEntry};
use crate::schedule::calendar::{format_date, parse_date};

const TASK_COLUMNS: &str = "SELECT id, text, category, priority, done, created_at,
        completed_at, deadline, time_logged_minutes, is_recurring, recurring_pattern,
        recurring_interval, recurring_days, recurring_start_date, parent_recurring_id,
        current_streak, longest_streak, total_missed, total_completed, last_completed_date
     FROM tasks";

/// Field patch written by detection in one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionPatch {
    pub deadline: NaiveDate,
    pub new_misses: u32,
}

fn parse_datetime(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_optional_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| parse_date(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Build a Task from a database row
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let priority: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let completed_at: Option<String> = row.get(6)?;
    let is_recurring: bool = row.get(9)?;
    let pattern: Option<String> = row.get(10)?;
    let interval: u32 = row.get(11)?;
    let days: String = row.get(12)?;
    let parent: Option<String> = row.get(14)?;

    let recurrence = if is_recurring {
        let days: BTreeSet<u8> = serde_json::from_str(&days).map_err(|e| conversion_error(12, e))?;
        Some(Recurrence {
            // Unknown names are kept as a malformed (None) pattern.
            pattern: pattern.and_then(|p| p.parse().ok()),
            interval: interval.max(1),
            days,
            start_date: parse_optional_date(13, row.get(13)?)?,
        })
    } else {
        None
    };

    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        category: row.get(2)?,
        priority: priority.parse().unwrap_or_default(),
        done: row.get(4)?,
        created_at: parse_datetime(5, &created_at)?,
        completed_at: completed_at
            .map(|raw| parse_datetime(6, &raw))
            .transpose()?,
        deadline: parse_optional_date(7, row.get(7)?)?,
        time_logged_minutes: row.get(8)?,
        recurrence,
        link: match parent {
            Some(root_id) => RecurrenceLink::Occurrence { root_id },
            None => RecurrenceLink::Root,
        },
        counters: HabitCounters {
            current_streak: row.get(15)?,
            longest_streak: row.get(16)?,
            total_missed: row.get(17)?,
            total_completed: row.get(18)?,
            last_completed_date: parse_optional_date(19, row.get(19)?)?,
        },
    })
}

/// SQLite database for habit storage.
///
/// Stores task records (recurring or not) and the missed-occurrence ledger.
pub struct CadenceDb {
    conn: Connection,
}

impl CadenceDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/cadence.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("cadence.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// Concurrent writers on other connections block (up to the busy timeout)
    /// until this transaction ends.
    pub(crate) fn begin_immediate(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // === Tasks ===

    /// Insert a task record.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        Self::insert_task_in(&self.conn, task)
    }

    fn insert_task_in(conn: &Connection, task: &Task) -> Result<()> {
        if task.text.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "text".to_string(),
                message: "task text must not be empty".to_string(),
            }
            .into());
        }
        let recurrence = task.recurrence.as_ref();
        let days = match recurrence {
            Some(r) => serde_json::to_string(&r.days)?,
            None => "[]".to_string(),
        };
        let parent = match &task.link {
            RecurrenceLink::Root => None,
            RecurrenceLink::Occurrence { root_id } => Some(root_id.as_str()),
        };
        conn.execute(
            "INSERT INTO tasks (id, text, category, priority, done, created_at, completed_at,
                deadline, time_logged_minutes, is_recurring, recurring_pattern, recurring_interval,
                recurring_days, recurring_start_date, parent_recurring_id, current_streak,
                longest_streak, total_missed, total_completed, last_completed_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                task.id,
                task.text,
                task.category,
                task.priority.as_str(),
                task.done,
                task.created_at.to_rfc3339(),
                task.completed_at.map(|dt| dt.to_rfc3339()),
                task.deadline.map(format_date),
                task.time_logged_minutes,
                recurrence.is_some(),
                recurrence.and_then(|r| r.pattern).map(|p| p.as_str()),
                recurrence.map_or(1, |r| r.interval.max(1)),
                days,
                recurrence.and_then(|r| r.start_date).map(format_date),
                parent,
                task.counters.current_streak,
                task.counters.longest_streak,
                task.counters.total_missed,
                task.counters.total_completed,
                task.counters.last_completed_date.map(format_date),
            ],
        )?;
        Ok(())
    }

    /// Point read of a task.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Self::get_task_in(&self.conn, id)
    }

    pub(crate) fn get_task_in(conn: &Connection, id: &str) -> Result<Option<Task>> {
        let sql = format!("{TASK_COLUMNS} WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_task).optional()?)
    }

    /// Full scan of all tasks, oldest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!("{TASK_COLUMNS} ORDER BY created_at ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;
        let mut tasks = Vec::new();
        for task in rows {
            tasks.push(task?);
        }
        Ok(tasks)
    }

    /// Ids of root habits eligible for detection: recurring, open, with a deadline.
    pub fn list_detection_candidates(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM tasks
             WHERE is_recurring = 1 AND done = 0 AND deadline IS NOT NULL
               AND parent_recurring_id IS NULL
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Write the detection result for one habit in a single statement.
    pub(crate) fn apply_detection_patch(
        conn: &Connection,
        id: &str,
        patch: &DetectionPatch,
    ) -> Result<()> {
        conn.execute(
            "UPDATE tasks
             SET deadline = ?2,
                 total_missed = total_missed + ?3,
                 current_streak = CASE WHEN ?3 > 0 THEN 0 ELSE current_streak END
             WHERE id = ?1",
            params![id, format_date(patch.deadline), patch.new_misses],
        )?;
        Ok(())
    }

    /// Record a completion event.
    ///
    /// A one-off task or occurrence is marked done. For a root habit, elapsed
    /// dates before today are first resolved as misses, exactly as detection
    /// would. Then, if today is a scheduled date, its occurrence is
    /// credited: counters are bumped, a completed occurrence record is stored
    /// and the cursor moves to the next scheduled date. A habit with nothing
    /// due today, or whose schedule cannot advance, keeps its counters.
    ///
    /// Returns `None` if the task does not exist.
    pub fn record_completion(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Task>> {
        let tx = self.begin_immediate()?;
        let Some(task) = Self::get_task_in(&tx, id)? else {
            return Ok(None);
        };

        if task.is_recurring() && task.is_root() {
            Self::complete_habit_in(&tx, task, now)?;
        } else {
            tx.execute(
                "UPDATE tasks SET done = 1, completed_at = ?2 WHERE id = ?1",
                params![id, now.to_rfc3339()],
            )?;
        }

        let updated = Self::get_task_in(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn complete_habit_in(conn: &Connection, mut habit: Task, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();
        if habit.deadline.is_some_and(|due| due < today) {
            let caught_up = detection::resolve_elapsed(conn, &habit, now)?;
            habit.deadline = caught_up.new_deadline;
        }

        let (Some(recurrence), Some(due)) = (habit.recurrence.as_ref(), habit.deadline) else {
            return Ok(());
        };
        if due > today {
            tracing::debug!(
                habit_id = %habit.id,
                next_due = %due,
                "completion ignored; nothing due today"
            );
            return Ok(());
        }
        let next = match recurrence.next_after(due) {
            Some(next) if due == today => next,
            _ => {
                tracing::warn!(
                    habit_id = %habit.id,
                    pattern = recurrence.pattern_label(),
                    stuck_at = %due,
                    "schedule cannot advance; completion not recorded"
                );
                return Ok(());
            }
        };

        conn.execute(
            "UPDATE tasks
             SET deadline = ?2,
                 total_completed = total_completed + 1,
                 current_streak = current_streak + 1,
                 longest_streak = MAX(longest_streak, current_streak + 1),
                 last_completed_date = ?3
             WHERE id = ?1",
            params![habit.id, format_date(next), format_date(today)],
        )?;

        let occurrence = Task {
            id: uuid::Uuid::new_v4().to_string(),
            done: true,
            completed_at: Some(now),
            deadline: Some(today),
            created_at: now,
            time_logged_minutes: 0,
            recurrence: None,
            link: RecurrenceLink::Occurrence {
                root_id: habit.id.clone(),
            },
            counters: HabitCounters::default(),
            ..habit
        };
        Self::insert_task_in(conn, &occurrence)
    }

    /// Add logged work time to a task.
    pub fn log_time(&self, id: &str, minutes: u64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET time_logged_minutes = time_logged_minutes + ?2 WHERE id = ?1",
            params![id, minutes],
        )?;
        Ok(changed == 1)
    }

    // === Ledger reads ===

    /// Ledger entries for one root habit, most recent first.
    pub fn missed_logs(
        &self,
        root_id: &str,
        range: DateRange,
        limit: Option<usize>,
    ) -> Result<Vec<MissedLogEntry>> {
        ledger::logs_for(&self.conn, root_id, range, limit)
    }

    /// Ledger entries for every habit, most recent first.
    pub fn all_missed_logs(&self, range: DateRange) -> Result<Vec<MissedLogEntry>> {
        ledger::all_logs(&self.conn, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::habit::Priority;
    use crate::schedule::calendar::RecurrencePattern;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{date}T09:00:00+00:00"))
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn task_round_trip_preserves_recurrence() {
        let db = CadenceDb::open_memory().unwrap();
        let mut rec = Recurrence::new(RecurrencePattern::Weekly);
        rec.days = [1, 3, 5].into_iter().collect();
        let mut habit = Task::new_habit("Gym", rec, d("2024-01-01"), at("2024-01-01"));
        habit.category = Some("health".into());
        habit.priority = Priority::High;
        db.insert_task(&habit).unwrap();

        let loaded = db.get_task(&habit.id).unwrap().unwrap();
        assert_eq!(loaded.recurrence, habit.recurrence);
        assert_eq!(loaded.deadline, Some(d("2024-01-01")));
        assert_eq!(loaded.priority, Priority::High);
        assert_eq!(loaded.link, RecurrenceLink::Root);
        assert_eq!(loaded.created_at, habit.created_at);
    }

    #[test]
    fn unknown_pattern_loads_as_malformed() {
        let db = CadenceDb::open_memory().unwrap();
        let habit = Task::new_habit(
            "Odd",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        db.insert_task(&habit).unwrap();
        db.conn()
            .execute(
                "UPDATE tasks SET recurring_pattern = 'fortnightly' WHERE id = ?1",
                params![habit.id],
            )
            .unwrap();
        let loaded = db.get_task(&habit.id).unwrap().unwrap();
        assert_eq!(loaded.recurrence.unwrap().pattern, None);
    }

    #[test]
    fn blank_text_is_rejected() {
        let db = CadenceDb::open_memory().unwrap();
        let err = db.insert_task(&Task::new("   ", at("2024-01-01"))).unwrap_err();
        let CoreError::Validation(ValidationError::InvalidValue { field, .. }) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(field, "text");
        assert!(db.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn get_missing_task_is_none() {
        let db = CadenceDb::open_memory().unwrap();
        assert!(db.get_task("nope").unwrap().is_none());
    }

    #[test]
    fn detection_candidates_are_open_roots_with_deadline() {
        let db = CadenceDb::open_memory().unwrap();
        let now = at("2024-01-01");
        let root = Task::new_habit(
            "A",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            now,
        );
        let mut done = Task::new_habit(
            "B",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            now,
        );
        done.done = true;
        let mut child = Task::new_habit(
            "C",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            now,
        );
        child.link = RecurrenceLink::Occurrence { root_id: root.id.clone() };
        let mut no_deadline = Task::new_habit(
            "D",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            now,
        );
        no_deadline.deadline = None;
        let one_off = Task::new("E", now);
        for task in [&root, &done, &child, &no_deadline, &one_off] {
            db.insert_task(task).unwrap();
        }

        assert_eq!(db.list_detection_candidates().unwrap(), vec![root.id]);
    }

    #[test]
    fn detection_patch_resets_streak_only_on_misses() {
        let db = CadenceDb::open_memory().unwrap();
        let mut habit = Task::new_habit(
            "A",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        habit.counters.current_streak = 5;
        db.insert_task(&habit).unwrap();

        let patch = DetectionPatch { deadline: d("2024-01-02"), new_misses: 0 };
        CadenceDb::apply_detection_patch(db.conn(), &habit.id, &patch).unwrap();
        assert_eq!(db.get_task(&habit.id).unwrap().unwrap().counters.current_streak, 5);

        let patch = DetectionPatch { deadline: d("2024-01-05"), new_misses: 3 };
        CadenceDb::apply_detection_patch(db.conn(), &habit.id, &patch).unwrap();
        let loaded = db.get_task(&habit.id).unwrap().unwrap();
        assert_eq!(loaded.counters.current_streak, 0);
        assert_eq!(loaded.counters.total_missed, 3);
        assert_eq!(loaded.deadline, Some(d("2024-01-05")));
    }

    #[test]
    fn completing_a_habit_resolves_the_cursor() {
        let db = CadenceDb::open_memory().unwrap();
        let habit = Task::new_habit(
            "Read",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-03"),
            at("2024-01-01"),
        );
        db.insert_task(&habit).unwrap();

        let updated = db.record_completion(&habit.id, at("2024-01-03")).unwrap().unwrap();
        assert_eq!(updated.deadline, Some(d("2024-01-04")));
        assert_eq!(updated.counters.total_completed, 1);
        assert_eq!(updated.counters.current_streak, 1);
        assert_eq!(updated.counters.longest_streak, 1);
        assert_eq!(updated.counters.last_completed_date, Some(d("2024-01-03")));
        assert!(!updated.done);

        // Cursor is now tomorrow: a second completion today is a no-op.
        let again = db.record_completion(&habit.id, at("2024-01-03")).unwrap().unwrap();
        assert_eq!(again.counters.total_completed, 1);

        let occurrences: Vec<_> = db
            .list_tasks()
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_root())
            .collect();
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].root_id(), habit.id);
        assert!(occurrences[0].done);
        assert_eq!(occurrences[0].deadline, Some(d("2024-01-03")));
    }

    fn occurrences_of(db: &CadenceDb, root_id: &str) -> Vec<Task> {
        db.list_tasks()
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_root() && t.root_id() == root_id)
            .collect()
    }

    #[test]
    fn late_completion_logs_elapsed_dates_and_credits_today() {
        let db = CadenceDb::open_memory().unwrap();
        let mut habit = Task::new_habit(
            "Read",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-01"),
            at("2024-01-01"),
        );
        habit.counters.current_streak = 3;
        habit.counters.longest_streak = 3;
        db.insert_task(&habit).unwrap();

        let updated = db.record_completion(&habit.id, at("2024-01-05")).unwrap().unwrap();
        assert_eq!(updated.deadline, Some(d("2024-01-06")));
        assert_eq!(updated.counters.total_missed, 4);
        assert_eq!(updated.counters.total_completed, 1);
        assert_eq!(updated.counters.current_streak, 1);
        assert_eq!(updated.counters.longest_streak, 3);
        assert_eq!(updated.counters.last_completed_date, Some(d("2024-01-05")));

        let occurrences = occurrences_of(&db, &habit.id);
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].deadline, Some(d("2024-01-05")));

        let outcome =
            crate::detection::detect_and_log_missed(&db, &habit.id, at("2024-01-06")).unwrap();
        assert_eq!(outcome.missed_count, 0);
        let missed: Vec<NaiveDate> = db
            .missed_logs(&habit.id, DateRange::default(), None)
            .unwrap()
            .iter()
            .map(|l| l.missed_date)
            .collect();
        assert_eq!(
            missed,
            vec![d("2024-01-04"), d("2024-01-03"), d("2024-01-02"), d("2024-01-01")]
        );
    }

    #[test]
    fn completion_on_an_unscheduled_day_credits_nothing() {
        let db = CadenceDb::open_memory().unwrap();
        let mut rec = Recurrence::new(RecurrencePattern::Weekly);
        rec.days = [1].into_iter().collect(); // Mondays
        let habit = Task::new_habit("Gym", rec, d("2024-01-01"), at("2024-01-01"));
        db.insert_task(&habit).unwrap();

        // Wednesday: Monday's miss is logged, nothing is due today.
        let updated = db.record_completion(&habit.id, at("2024-01-03")).unwrap().unwrap();
        assert_eq!(updated.deadline, Some(d("2024-01-08")));
        assert_eq!(updated.counters.total_missed, 1);
        assert_eq!(updated.counters.total_completed, 0);
        assert!(occurrences_of(&db, &habit.id).is_empty());
    }

    #[test]
    fn malformed_pattern_completion_leaves_counters_alone() {
        let db = CadenceDb::open_memory().unwrap();
        let habit = Task::new_habit(
            "Odd",
            Recurrence::new(RecurrencePattern::Daily),
            d("2024-01-05"),
            at("2024-01-01"),
        );
        db.insert_task(&habit).unwrap();
        db.conn()
            .execute(
                "UPDATE tasks SET recurring_pattern = NULL WHERE id = ?1",
                params![habit.id],
            )
            .unwrap();

        for _ in 0..3 {
            db.record_completion(&habit.id, at("2024-01-05")).unwrap();
        }
        let loaded = db.get_task(&habit.id).unwrap().unwrap();
        assert_eq!(loaded.counters.total_completed, 0);
        assert_eq!(loaded.counters.current_streak, 0);
        assert_eq!(loaded.counters.longest_streak, 0);
        assert_eq!(loaded.deadline, Some(d("2024-01-05")));
        assert!(occurrences_of(&db, &habit.id).is_empty());
    }

    #[test]
    fn completing_a_one_off_marks_done() {
        let db = CadenceDb::open_memory().unwrap();
        let task = Task::new("Report", at("2024-01-01"));
        db.insert_task(&task).unwrap();
        let updated = db.record_completion(&task.id, at("2024-01-02")).unwrap().unwrap();
        assert!(updated.done);
        assert_eq!(updated.completed_at, Some(at("2024-01-02")));
        assert!(db.record_completion("missing", at("2024-01-02")).unwrap().is_none());
    }

    #[test]
    fn log_time_accumulates() {
        let db = CadenceDb::open_memory().unwrap();
        let task = Task::new("Report", at("2024-01-01"));
        db.insert_task(&task).unwrap();
        assert!(db.log_time(&task.id, 25).unwrap());
        assert!(db.log_time(&task.id, 5).unwrap());
        assert!(!db.log_time("missing", 5).unwrap());
        assert_eq!(db.get_task(&task.id).unwrap().unwrap().time_logged_minutes, 30);
    }
}
