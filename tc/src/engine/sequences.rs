//! Per-block parameter and change sequences

use rand::Rng;
use tracing::debug;

use crate::error::{ControllerError, Result};
use crate::phase::{ChangeRule, PhaseConfig};
use crate::randomize;

/// Changed flag plus the optional sample-occluded flag of one trial
pub type ChangeSlot = (bool, Option<bool>);

/// Sequences consumed one element per trial, reshuffled at every block start
#[derive(Debug, Clone)]
pub struct BlockSequences {
    timings: Vec<(u64, u64)>,
    changes: Vec<ChangeSlot>,
}

impl BlockSequences {
    /// Unshuffled sequences; call [`reshuffle`](Self::reshuffle) before use
    pub fn new(config: &PhaseConfig) -> Self {
        let n = config.block_length;
        let unchanged = n / 2;
        let changes = (0..n)
            .map(|i| {
                let changed = i >= unchanged;
                let occluded = config.occlusion.then_some(i % 2 == 1);
                (changed, occluded)
            })
            .collect();
        Self {
            timings: config.timing.expand(n),
            changes,
        }
    }

    pub fn reshuffle<R: Rng + ?Sized>(&mut self, config: &PhaseConfig, rng: &mut R) -> Result<()> {
        debug!(phase = %config.phase, rule = ?config.change_rule, "BlockSequences::reshuffle: called");
        randomize::shuffle(&mut self.timings, rng);
        self.changes = match config.change_rule {
            ChangeRule::Balanced { max_run } => {
                randomize::shuffle_with_max_run_by(&self.changes, max_run, |slot| slot.0, rng)?
            }
            ChangeRule::CoinFlip => (0..config.block_length)
                .map(|_| {
                    let occluded = config.occlusion.then(|| rng.random_bool(0.5));
                    (rng.random_bool(0.5), occluded)
                })
                .collect(),
        };
        Ok(())
    }

    /// `(sample_ms, mask_ms)` for trial `trial_number` (1-based)
    pub fn timing(&self, trial_number: usize) -> Result<(u64, u64)> {
        self.timings
            .get(trial_number.wrapping_sub(1))
            .copied()
            .ok_or_else(|| ControllerError::config(format!("no timing for trial {}", trial_number)))
    }

    pub fn change(&self, trial_number: usize) -> Result<ChangeSlot> {
        self.changes
            .get(trial_number.wrapping_sub(1))
            .copied()
            .ok_or_else(|| ControllerError::config(format!("no change flag for trial {}", trial_number)))
    }

    pub fn changes(&self) -> &[ChangeSlot] {
        &self.changes
    }
}
