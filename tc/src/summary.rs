//! Per-block summaries of a trial log

use std::collections::BTreeMap;

use crate::engine::Outcome;
use crate::phase::PhaseId;
use crate::recorder::TrialRecord;

/// Aggregates for one (phase, block) pair
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub phase: PhaseId,
    pub block: u32,
    /// Rows in the log, timeouts included
    pub attempts: usize,
    /// Distinct trial numbers seen
    pub trials: usize,
    pub answered: usize,
    pub correct: usize,
    pub timeouts: usize,
    /// Mean reaction time of answered attempts
    pub mean_rt_ms: Option<f64>,
}

impl BlockSummary {
    /// Percent of answered attempts that were correct
    pub fn accuracy_percentage(&self) -> Option<f64> {
        if self.answered == 0 {
            return None;
        }
        Some(self.correct as f64 / self.answered as f64 * 100.0)
    }

    /// Share of attempts that were repeats of an earlier timed-out attempt
    pub fn repeat_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        (self.attempts - self.trials) as f64 / self.attempts as f64
    }
}

#[derive(Default)]
struct Tally {
    attempts: usize,
    trial_numbers: std::collections::BTreeSet<usize>,
    answered: usize,
    correct: usize,
    timeouts: usize,
    rt_total: u64,
}

/// Group log rows by phase and block, in log order of first appearance
pub fn summarize(records: &[TrialRecord]) -> Vec<BlockSummary> {
    let mut order: Vec<(PhaseId, u32)> = Vec::new();
    let mut tallies: BTreeMap<(PhaseId, u32), Tally> = BTreeMap::new();

    for record in records {
        let key = (record.phase, record.block);
        let tally = tallies.entry(key).or_insert_with(|| {
            order.push(key);
            Tally::default()
        });
        tally.attempts += 1;
        tally.trial_numbers.insert(record.trial);
        match record.outcome {
            Outcome::TimedOut => tally.timeouts += 1,
            outcome => {
                tally.answered += 1;
                tally.rt_total += record.reaction_time_ms;
                if outcome == Outcome::Correct {
                    tally.correct += 1;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| tallies.remove(&key).map(|tally| (key, tally)))
        .map(|((phase, block), tally)| BlockSummary {
            phase,
            block,
            attempts: tally.attempts,
            trials: tally.trial_numbers.len(),
            answered: tally.answered,
            correct: tally.correct,
            timeouts: tally.timeouts,
            mean_rt_ms: (tally.answered > 0).then(|| tally.rt_total as f64 / tally.answered as f64),
        })
        .collect()
}
