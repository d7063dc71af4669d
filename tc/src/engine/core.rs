//! TrialEngine - the trial/block state machine

use tracing::{debug, info, warn};

use crate::capability::{Axes, Region, Rig, Screen};
use crate::error::{ControllerError, Result};
use crate::phase::{CreditRule, PhaseId};
use crate::recorder::TrialRecord;
use crate::stimulus::{ComparisonContext, Selection, pick_comparison, pick_sample, pick_sample_for_repeat};

use super::context::SessionContext;
use super::credit::training_credit;
use super::state::{Block, FinishReason, Outcome, TickOutcome, Trial, TrialState};

/// Drives trials from start cue to outcome, one tick per rendered frame
///
/// All waits are elapsed-time checks against the rig clock, so every tick
/// returns promptly and the caller can honor a quit request between ticks.
pub struct TrialEngine {
    ctx: SessionContext,
    rig: Rig,
    block: Block,
    trial: Option<Trial>,
    state: TrialState,
    finished: Option<FinishReason>,
}

impl TrialEngine {
    /// Start a session: stop at once if the phase is already complete,
    /// otherwise open the first block and set up its first trial
    pub fn start(ctx: SessionContext, rig: Rig) -> Result<Self> {
        let initial_block = match (ctx.config.phase, ctx.config.credit_rule) {
            (PhaseId::PreTraining, _) | (_, CreditRule::Daily) => 0,
            _ => ctx.progress.completed_session_count,
        };
        debug!(phase = %ctx.config.phase, initial_block, "TrialEngine::start: called");

        let mut engine = Self {
            ctx,
            rig,
            block: Block {
                index: initial_block,
                ..Block::default()
            },
            trial: None,
            state: TrialState::AwaitingStart,
            finished: None,
        };

        if engine.ctx.progress.completed_session_count >= engine.ctx.config.qualifying_sessions {
            info!(
                phase = %engine.ctx.config.phase,
                sessions = engine.ctx.progress.completed_session_count,
                "Phase criterion already met, nothing to run"
            );
            engine.finished = Some(FinishReason::AlreadyQualified);
            return Ok(engine);
        }

        engine.open_block()?;
        engine.next_trial()?;
        Ok(engine)
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn block(&self) -> Block {
        self.block
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.trial.as_ref()
    }

    pub fn finished(&self) -> Option<FinishReason> {
        self.finished
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Advance the state machine by one frame
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if let Some(reason) = self.finished {
            return Ok(TickOutcome::Finished(reason));
        }

        let now = self.rig.clock.now_ms();
        match self.state {
            TrialState::AwaitingStart => {
                if self.rig.pointer.collided_with(Region::StartBox) {
                    debug!(trial = self.block.trial_count, "tick: start cue acknowledged");
                    self.rig.pointer.recenter(Axes::Horizontal);
                    self.state = TrialState::Sampling { since_ms: now };
                }
            }
            TrialState::Sampling { since_ms } => {
                if now.saturating_sub(since_ms) >= self.trial()?.search_duration_ms {
                    self.state = TrialState::Masking { since_ms: now };
                }
            }
            TrialState::Masking { since_ms } => {
                if now.saturating_sub(since_ms) >= self.trial()?.mask_duration_ms {
                    self.state = TrialState::AwaitingResponse { since_ms: now };
                }
            }
            TrialState::AwaitingResponse { since_ms } => self.poll_response(now, since_ms)?,
            TrialState::Rewarding => self.next_trial()?,
            TrialState::Penalizing { since_ms } => {
                if now.saturating_sub(since_ms) >= self.ctx.config.penalty_ms {
                    self.next_trial()?;
                }
            }
            TrialState::TimedOut => self.repeat_trial()?,
        }

        if let Some(reason) = self.finished {
            return Ok(TickOutcome::Finished(reason));
        }
        self.draw()?;
        Ok(TickOutcome::Continue)
    }

    /// Flush the trial log before the process exits
    pub fn shutdown(&mut self) -> Result<()> {
        info!(
            state = %self.state,
            block = self.block.index,
            trial = self.block.trial_count,
            rows = self.ctx.recorder.rows(),
            "Shutting down session"
        );
        self.ctx.recorder.flush()
    }

    fn trial(&self) -> Result<&Trial> {
        self.trial
            .as_ref()
            .ok_or_else(|| ControllerError::config("no trial in progress"))
    }

    fn draw(&mut self) -> Result<()> {
        let trial = self
            .trial
            .as_ref()
            .ok_or_else(|| ControllerError::config("no trial to draw"))?;
        let screen = match self.state {
            TrialState::AwaitingStart => Screen::StartCue,
            TrialState::Sampling { .. } => Screen::Sample(&trial.sample_ref),
            TrialState::AwaitingResponse { .. } => Screen::Comparison(trial.test_ref()),
            TrialState::Penalizing { .. } => Screen::Penalty,
            TrialState::Masking { .. } | TrialState::Rewarding | TrialState::TimedOut => Screen::Blank,
        };
        self.rig.display.show(screen);
        self.rig.display.present_frame();
        Ok(())
    }

    fn poll_response(&mut self, now: u64, since_ms: u64) -> Result<()> {
        let rt = now.saturating_sub(since_ms);
        let window = self.ctx.config.response_window_ms;

        if rt >= window {
            self.finish_trial(window, Outcome::TimedOut)?;
            self.state = TrialState::TimedOut;
            return Ok(());
        }

        let chose_change = if self.rig.pointer.collided_with(Region::ChangeButton) {
            true
        } else if self.rig.pointer.collided_with(Region::NoChangeButton) {
            false
        } else {
            return Ok(());
        };

        let correct = chose_change == self.trial()?.is_changed;
        let outcome = if correct { Outcome::Correct } else { Outcome::Incorrect };
        self.finish_trial(rt, outcome)?;
        self.rig.feedback.play_feedback(correct);

        if correct {
            self.block.correct_count += 1;
            self.rig.feedback.dispense_reward();
            self.state = TrialState::Rewarding;
        } else {
            self.state = TrialState::Penalizing { since_ms: now };
        }
        Ok(())
    }

    /// Stamp the outcome on the current trial and log it
    fn finish_trial(&mut self, reaction_time_ms: u64, outcome: Outcome) -> Result<()> {
        let at = self.rig.clock.local_now();
        let trial = self
            .trial
            .as_mut()
            .ok_or_else(|| ControllerError::config("no trial in progress"))?;
        trial.reaction_time_ms = reaction_time_ms;
        trial.outcome = Some(outcome);
        debug!(
            block = trial.block,
            trial = trial.trial_number,
            ?outcome,
            reaction_time_ms,
            "finish_trial: recording"
        );
        let record = TrialRecord::from_trial(&self.ctx.subject, at, trial, outcome);
        self.ctx.recorder.record(&record)
    }

    /// Move to a new trial slot, crossing a block boundary when the current
    /// block is full
    fn next_trial(&mut self) -> Result<()> {
        if self.block.trial_count >= self.ctx.config.block_length {
            if let Some(reason) = self.close_block()? {
                self.finished = Some(reason);
                return Ok(());
            }
            self.open_block()?;
        }

        if let Some(every) = self.ctx.config.pool_reshuffle_every
            && every > 0
            && self.block.trial_count % every == 0
        {
            self.ctx.pool.shuffle(&mut self.ctx.rng);
        }

        self.block.trial_count += 1;
        let trial_number = self.block.trial_count;
        let (is_changed, occlusion_flag) = self.ctx.sequences.change(trial_number)?;
        let (search_duration_ms, mask_duration_ms) = self.ctx.sequences.timing(trial_number)?;
        let index = pick_sample(trial_number, self.ctx.pool.len(), self.ctx.config.sample_rule);

        let mut trial = Trial {
            phase: self.ctx.config.phase,
            block: self.block.index,
            trial_number,
            is_changed,
            occlusion_flag,
            sample: Selection::original(index),
            comparison: None,
            sample_ref: self.ctx.pool.get(index, 0)?.clone(),
            comparison_ref: None,
            search_duration_ms,
            mask_duration_ms,
            reaction_time_ms: 0,
            outcome: None,
        };
        self.fill_stimuli(&mut trial, index)?;
        debug!(
            block = trial.block,
            trial = trial_number,
            is_changed,
            sample = %trial.sample_ref,
            "next_trial: prepared"
        );
        self.trial = Some(trial);
        self.begin_attempt();
        Ok(())
    }

    /// Re-run the current slot with a different sample; timing, changed flag
    /// and trial number stay the same
    fn repeat_trial(&mut self) -> Result<()> {
        let mut trial = self
            .trial
            .take()
            .ok_or_else(|| ControllerError::config("no trial to repeat"))?;
        let index = pick_sample_for_repeat(
            trial.sample.index,
            self.ctx.pool.len(),
            self.ctx.config.sample_rule,
            &mut self.ctx.rng,
        );
        trial.reaction_time_ms = 0;
        trial.outcome = None;
        self.fill_stimuli(&mut trial, index)?;
        debug!(
            block = trial.block,
            trial = trial.trial_number,
            sample = %trial.sample_ref,
            "repeat_trial: prepared"
        );
        self.trial = Some(trial);
        self.begin_attempt();
        Ok(())
    }

    fn begin_attempt(&mut self) {
        self.rig.pointer.recenter(Axes::Vertical);
        self.state = TrialState::AwaitingStart;
    }

    /// Resolve sample and comparison images for sample entry `index`
    fn fill_stimuli(&mut self, trial: &mut Trial, index: usize) -> Result<()> {
        let sample_variant = match trial.occlusion_flag {
            Some(true) => 1,
            _ => 0,
        };
        trial.sample = Selection {
            index,
            variant: sample_variant,
        };
        trial.sample_ref = self.ctx.pool.get(index, sample_variant)?.clone();

        trial.comparison = if trial.is_changed {
            let ctx = ComparisonContext {
                block: self.block.index,
                sample_variant,
            };
            Some(pick_comparison(
                index,
                self.ctx.pool.len(),
                self.ctx.config.comparison_rule,
                ctx,
                &mut self.ctx.rng,
            ))
        } else {
            None
        };
        trial.comparison_ref = match trial.comparison {
            Some(sel) => Some(self.ctx.pool.get(sel.index, sel.variant)?.clone()),
            None => None,
        };
        if trial.comparison_ref.as_ref() == Some(&trial.sample_ref) {
            warn!(sample = %trial.sample_ref, "Comparison resolved to the sample image");
        }
        Ok(())
    }

    /// Apply the crediting policy for the block that just filled up
    ///
    /// Returns the reason to stop when a cap or criterion is reached.
    fn close_block(&mut self) -> Result<Option<FinishReason>> {
        let config = &self.ctx.config;
        let block = self.block;
        let persisted = match config.credit_rule {
            CreditRule::BlockIndex => {
                self.ctx.store.write_count(config.phase.as_str(), block.index)?;
                block.index
            }
            CreditRule::Accuracy | CreditRule::Daily => {
                let passed = config.credit_rule == CreditRule::Daily || config.passes(block.correct_count);
                let count = training_credit(
                    self.ctx.progress.completed_session_count,
                    self.ctx.progress.credited_on(self.ctx.today),
                    passed,
                );
                self.ctx
                    .store
                    .write_progress(config.phase.as_str(), count, Some(self.ctx.today))?;
                count
            }
        };
        info!(
            phase = %config.phase,
            block = block.index,
            correct = block.correct_count,
            of = config.block_length,
            sessions = persisted,
            "Block complete"
        );

        if config.credit_rule == CreditRule::BlockIndex && config.session_cap.is_some_and(|cap| block.index >= cap) {
            return Ok(Some(FinishReason::SessionCapReached));
        }
        if persisted >= config.qualifying_sessions {
            return Ok(Some(FinishReason::QualifyingSessionsReached));
        }
        Ok(None)
    }

    fn open_block(&mut self) -> Result<()> {
        self.block = Block {
            index: self.block.index + 1,
            trial_count: 0,
            correct_count: 0,
        };
        self.ctx.sequences.reshuffle(&self.ctx.config, &mut self.ctx.rng)?;
        self.ctx.pool.shuffle(&mut self.ctx.rng);
        info!(phase = %self.ctx.config.phase, block = self.block.index, "Block started");
        Ok(())
    }
}
