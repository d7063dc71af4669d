//! Trial and block state owned by the engine

use crate::phase::PhaseId;
use crate::stimulus::{Selection, StimulusRef};

/// Where the current trial is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Start box shown, waiting for the subject to touch it
    AwaitingStart,
    /// Sample on screen since `since_ms`
    Sampling { since_ms: u64 },
    /// Blank mask on screen since `since_ms`
    Masking { since_ms: u64 },
    /// Comparison on screen; reaction time counts from `since_ms`
    AwaitingResponse { since_ms: u64 },
    /// Correct choice rewarded; the next tick starts a new trial
    Rewarding,
    /// Incorrect choice; penalty screen held from `since_ms`
    Penalizing { since_ms: u64 },
    /// No choice inside the response window; the next tick repeats the slot
    TimedOut,
}

impl std::fmt::Display for TrialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AwaitingStart => "awaiting-start",
            Self::Sampling { .. } => "sampling",
            Self::Masking { .. } => "masking",
            Self::AwaitingResponse { .. } => "awaiting-response",
            Self::Rewarding => "rewarding",
            Self::Penalizing { .. } => "penalizing",
            Self::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Result of one trial attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
    TimedOut,
}

impl Outcome {
    /// Value written in the log's outcome column
    pub fn log_value(self) -> &'static str {
        match self {
            Self::Correct => "1",
            Self::Incorrect => "0",
            Self::TimedOut => "NA",
        }
    }

    pub fn from_log_value(value: &str) -> Option<Self> {
        match value {
            "1" => Some(Self::Correct),
            "0" => Some(Self::Incorrect),
            "NA" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

/// Counters for the block in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    pub index: u32,
    /// Trials started in this block; also the current trial number
    pub trial_count: usize,
    pub correct_count: usize,
}

/// One trial slot, rebuilt with fresh stimuli when it is repeated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    pub phase: PhaseId,
    pub block: u32,
    pub trial_number: usize,
    pub is_changed: bool,
    pub occlusion_flag: Option<bool>,
    pub sample: Selection,
    pub comparison: Option<Selection>,
    pub sample_ref: StimulusRef,
    pub comparison_ref: Option<StimulusRef>,
    pub search_duration_ms: u64,
    pub mask_duration_ms: u64,
    pub reaction_time_ms: u64,
    pub outcome: Option<Outcome>,
}

impl Trial {
    /// Image shown at test time: the comparison on changed trials, the
    /// sample again otherwise
    pub fn test_ref(&self) -> &StimulusRef {
        self.comparison_ref.as_ref().unwrap_or(&self.sample_ref)
    }
}

/// Why a session ended without being cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The persisted count already met the phase criterion at startup
    AlreadyQualified,
    /// A block boundary pushed the persisted count to the criterion
    QualifyingSessionsReached,
    /// The evaluation block index reached the phase cap
    SessionCapReached,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::AlreadyQualified => "phase already complete",
            Self::QualifyingSessionsReached => "qualifying sessions reached",
            Self::SessionCapReached => "session cap reached",
        };
        f.write_str(text)
    }
}

/// What a tick left the engine doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished(FinishReason),
}
