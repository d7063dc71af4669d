//! Trial engine
//!
//! A finite-state sequencer for one session: start cue, sample, mask,
//! response window, outcome, repeat. Block boundaries persist progress,
//! reshuffle the per-block sequences and decide when the session ends.

mod context;
mod core;
mod credit;
mod sequences;
mod state;

pub use context::{SessionContext, SessionSettings};
pub use core::TrialEngine;
pub use credit::training_credit;
pub use sequences::{BlockSequences, ChangeSlot};
pub use state::{Block, FinishReason, Outcome, TickOutcome, Trial, TrialState};
