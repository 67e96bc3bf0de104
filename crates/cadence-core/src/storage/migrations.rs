//! Database schema migrations for cadence.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i32>>(0)
    })
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to read schema_version");
        None
    })
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: tasks with recurrence fields and the missed-occurrence ledger.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                    TEXT PRIMARY KEY,
            text                  TEXT NOT NULL,
            category              TEXT,
            priority              TEXT NOT NULL DEFAULT 'medium',
            done                  INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL,
            completed_at          TEXT,
            deadline              TEXT,
            time_logged_minutes   INTEGER NOT NULL DEFAULT 0,
            is_recurring          INTEGER NOT NULL DEFAULT 0,
            recurring_pattern     TEXT,
            recurring_interval    INTEGER NOT NULL DEFAULT 1,
            recurring_days        TEXT NOT NULL DEFAULT '[]',
            recurring_start_date  TEXT,
            parent_recurring_id   TEXT,
            current_streak        INTEGER NOT NULL DEFAULT 0,
            longest_streak        INTEGER NOT NULL DEFAULT 0,
            total_missed          INTEGER NOT NULL DEFAULT 0,
            total_completed       INTEGER NOT NULL DEFAULT 0,
            last_completed_date   TEXT
        );

        CREATE TABLE IF NOT EXISTS missed_logs (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            recurring_root_id  TEXT NOT NULL,
            missed_date        TEXT NOT NULL,
            pattern            TEXT NOT NULL,
            task_text          TEXT NOT NULL,
            logged_at          TEXT NOT NULL,
            UNIQUE (recurring_root_id, missed_date)
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: indexes for detection scans and ledger reads.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tasks_detection
            ON tasks(is_recurring, done, parent_recurring_id, deadline);
         CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_recurring_id);
         CREATE INDEX IF NOT EXISTS idx_missed_logs_date ON missed_logs(missed_date);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn ledger_pair_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let insert = "INSERT INTO missed_logs
                          (recurring_root_id, missed_date, pattern, task_text, logged_at)
                      VALUES ('h', '2024-01-01', 'daily', 't', '2024-01-02T00:00:00+00:00')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
