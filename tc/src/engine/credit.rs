//! Once-per-day crediting for accuracy- and daily-credited phases
//!
//! `baseline` is the count loaded when the process started and
//! `credited_today` says whether the date marker loaded at start was today.
//! Every block boundary rewrites the count from those two start-of-run facts,
//! so repeated passing blocks in one run (or repeated runs on one day) never
//! add more than one session, and a failing block on a day that was already
//! credited takes that credit back.

use tracing::debug;

/// Qualifying session count to persist after a completed training block
pub fn training_credit(baseline: u32, credited_today: bool, passed: bool) -> u32 {
    let count = match (passed, credited_today) {
        (true, false) => baseline + 1,
        (true, true) => baseline,
        (false, true) => baseline.saturating_sub(1),
        (false, false) => baseline,
    };
    debug!(baseline, credited_today, passed, count, "training_credit: decided");
    count
}
