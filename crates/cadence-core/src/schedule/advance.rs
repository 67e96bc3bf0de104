//! Moves a stale schedule cursor forward past everything already elapsed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::habit::Recurrence;

/// Result of advancing a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    /// First date not strictly before `today`, or the last computable date.
    pub deadline: NaiveDate,
    /// The pattern stopped producing dates before `today` was reached.
    pub stalled: bool,
}

/// Advance `deadline` until it is no longer strictly before `today`.
pub fn advance(recurrence: &Recurrence, deadline: NaiveDate, today: NaiveDate) -> Advance {
    let mut cursor = deadline;
    while cursor < today {
        match recurrence.next_after(cursor) {
            Some(next) => cursor = next,
            None => {
                tracing::warn!(
                    pattern = recurrence.pattern_label(),
                    stuck_at = %cursor,
                    today = %today,
                    "schedule cannot advance; deadline left in the past"
                );
                return Advance {
                    deadline: cursor,
                    stalled: true,
                };
            }
        }
    }
    Advance {
        deadline: cursor,
        stalled: false,
    }
}
