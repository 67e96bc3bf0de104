//! # Cadence Core Library
//!
//! This library provides the core logic for Cadence, a habit tracker that
//! keeps an auditable ledger of missed recurring occurrences. All operations
//! are available via the standalone `cadence` CLI binary, which is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Schedule**: Pure calendar arithmetic for daily, weekly, monthly and
//!   custom-interval habits, plus the bounded missed-date enumerator
//! - **Storage**: SQLite task store and missed ledger, TOML configuration
//! - **Detection**: Per-habit and sweeping miss detection that appends to the
//!   ledger and advances each habit's cursor atomically
//! - **Stats**: Read-only analytics (habit compliance, category mastery,
//!   lag indicators, missed-task triage)
//!
//! ## Key Components
//!
//! - [`Task`]: Task and habit record
//! - [`CadenceDb`]: Task store and ledger persistence
//! - [`Config`]: Application configuration management
//! - [`detect_and_log_missed`]: Detection for a single habit

pub mod detection;
pub mod error;
pub mod habit;
pub mod ledger;
pub mod schedule;
pub mod stats;
pub mod storage;

pub use detection::{
    check_all_missed_recurring, detect_and_log_missed, DetectionOutcome, SweepFailure,
    SweepSummary,
};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use habit::{HabitCounters, Priority, Recurrence, RecurrenceLink, Task};
pub use ledger::{AppendOutcome, DateRange, MissedLogEntry};
pub use schedule::{RecurrencePattern, MAX_ENUMERATED_DATES};
pub use stats::Period;
pub use storage::{CadenceDb, Config};
