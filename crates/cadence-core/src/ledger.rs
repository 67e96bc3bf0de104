//! Append-only ledger of missed occurrences.
//!
//! One row per `(recurring_root_id, missed_date)`; the pair is unique in the
//! schema, so appending an existing date is a no-op. Functions take a plain
//! [`Connection`] so they can run inside a caller's transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::calendar::{format_date, parse_date};

/// One missed occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedLogEntry {
    pub id: i64,
    pub recurring_root_id: String,
    pub missed_date: NaiveDate,
    /// Pattern at detection time
    pub pattern: String,
    /// Task text at detection time
    pub task_text: String,
    pub logged_at: DateTime<Utc>,
}

/// Result of [`append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Inserted,
    AlreadyExists,
}

/// Inclusive date bounds for ledger reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, recurring_root_id, missed_date, pattern, task_text, logged_at FROM missed_logs";

fn row_to_entry(row: &Row) -> rusqlite::Result<MissedLogEntry> {
    let missed_date: String = row.get(2)?;
    let logged_at: String = row.get(5)?;
    Ok(MissedLogEntry {
        id: row.get(0)?,
        recurring_root_id: row.get(1)?,
        missed_date: parse_date(&missed_date).map_err(|e| conversion_error(2, e))?,
        pattern: row.get(3)?,
        task_text: row.get(4)?,
        logged_at: DateTime::parse_from_rfc3339(&logged_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(5, e))?,
    })
}

pub(crate) fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Dates already recorded for `root_id`.
pub fn recorded_dates(conn: &Connection, root_id: &str) -> Result<BTreeSet<NaiveDate>> {
    let mut stmt =
        conn.prepare("SELECT missed_date FROM missed_logs WHERE recurring_root_id = ?1")?;
    let rows = stmt.query_map(params![root_id], |row| {
        let raw: String = row.get(0)?;
        parse_date(&raw).map_err(|e| conversion_error(0, e))
    })?;
    let mut dates = BTreeSet::new();
    for date in rows {
        dates.insert(date?);
    }
    Ok(dates)
}

/// Record a missed date unless it is already present.
pub fn append(
    conn: &Connection,
    root_id: &str,
    missed_date: NaiveDate,
    pattern: &str,
    task_text: &str,
    logged_at: DateTime<Utc>,
) -> Result<AppendOutcome> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO missed_logs
            (recurring_root_id, missed_date, pattern, task_text, logged_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            root_id,
            format_date(missed_date),
            pattern,
            task_text,
            logged_at.to_rfc3339(),
        ],
    )?;
    Ok(if changed == 1 {
        AppendOutcome::Inserted
    } else {
        AppendOutcome::AlreadyExists
    })
}

fn query_logs(
    conn: &Connection,
    root_id: Option<&str>,
    range: DateRange,
    limit: Option<usize>,
) -> Result<Vec<MissedLogEntry>> {
    let mut sql = String::from(SELECT_COLUMNS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(root_id) = root_id {
        clauses.push("recurring_root_id = ?");
        args.push(Box::new(root_id.to_string()));
    }
    if let Some(from) = range.from {
        clauses.push("missed_date >= ?");
        args.push(Box::new(format_date(from)));
    }
    if let Some(to) = range.to {
        clauses.push("missed_date <= ?");
        args.push(Box::new(format_date(to)));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY missed_date DESC, logged_at DESC, id DESC");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        row_to_entry,
    )?;
    let mut entries = Vec::new();
    for entry in rows {
        entries.push(entry?);
    }
    Ok(entries)
}

/// Entries for one root habit, most recent first.
pub fn logs_for(
    conn: &Connection,
    root_id: &str,
    range: DateRange,
    limit: Option<usize>,
) -> Result<Vec<MissedLogEntry>> {
    query_logs(conn, Some(root_id), range, limit)
}

/// Entries for every habit, most recent first.
pub fn all_logs(conn: &Connection, range: DateRange) -> Result<Vec<MissedLogEntry>> {
    query_logs(conn, None, range, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::migrate(&conn).unwrap();
        conn
    }

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn append_is_idempotent_per_root_and_date() {
        let conn = conn();
        let now = Utc::now();
        let first = append(&conn, "h1", d("2024-01-01"), "daily", "Read", now).unwrap();
        let second = append(&conn, "h1", d("2024-01-01"), "daily", "Read", now).unwrap();
        let other_root = append(&conn, "h2", d("2024-01-01"), "daily", "Walk", now).unwrap();
        assert_eq!(first, AppendOutcome::Inserted);
        assert_eq!(second, AppendOutcome::AlreadyExists);
        assert_eq!(other_root, AppendOutcome::Inserted);
        assert_eq!(recorded_dates(&conn, "h1").unwrap().len(), 1);
    }

    #[test]
    fn logs_are_most_recent_first_and_filterable() {
        let conn = conn();
        let now = Utc::now();
        for date in ["2024-01-01", "2024-01-03", "2024-01-02"] {
            append(&conn, "h1", d(date), "daily", "Read", now).unwrap();
        }
        append(&conn, "h2", d("2024-01-05"), "weekly", "Walk", now).unwrap();

        let logs = logs_for(&conn, "h1", DateRange::default(), None).unwrap();
        let dates: Vec<_> = logs.iter().map(|l| l.missed_date).collect();
        assert_eq!(dates, vec![d("2024-01-03"), d("2024-01-02"), d("2024-01-01")]);

        let limited = logs_for(&conn, "h1", DateRange::default(), Some(1)).unwrap();
        assert_eq!(limited.len(), 1);

        let range = DateRange::new(Some(d("2024-01-02")), Some(d("2024-01-03")));
        let ranged = all_logs(&conn, range).unwrap();
        assert_eq!(ranged.len(), 2);
        assert!(ranged.iter().all(|l| l.recurring_root_id == "h1"));

        assert_eq!(all_logs(&conn, DateRange::default()).unwrap()[0].recurring_root_id, "h2");
    }

    #[test]
    fn date_range_contains_is_inclusive() {
        let range = DateRange::new(Some(d("2024-01-02")), Some(d("2024-01-04")));
        assert!(range.contains(d("2024-01-02")));
        assert!(range.contains(d("2024-01-04")));
        assert!(!range.contains(d("2024-01-05")));
        assert!(DateRange::default().contains(d("1999-12-31")));
    }
}
