//! SessionProgress record

use chrono::NaiveDate;
use tracing::debug;

/// Date format used in `last_completed.txt`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Progress as persisted between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    /// Phase identifier as written on line 1 of `num_sessions.txt`
    pub phase: String,

    /// Qualifying sessions completed in this phase
    pub completed_session_count: u32,

    /// Date the last training block was completed, if any
    pub last_completion_date: Option<NaiveDate>,
}

impl SessionProgress {
    /// Fresh progress for a phase that has never been run
    pub fn initial(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            completed_session_count: 0,
            last_completion_date: None,
        }
    }

    /// Whether a block was already completed (and possibly credited) on `today`
    pub fn credited_on(&self, today: NaiveDate) -> bool {
        let result = self.last_completion_date == Some(today);
        debug!(?self.last_completion_date, %today, result, "SessionProgress::credited_on: called");
        result
    }
}
