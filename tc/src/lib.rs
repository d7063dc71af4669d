//! trialctl - change-detection trial controller
//!
//! Runs computer-controlled change-detection trials in blocks, carries a
//! subject through the phases of an experiment and logs every trial
//! attempt. One engine serves every phase; the phases differ only in their
//! `PhaseConfig` row.
//!
//! # Core Concepts
//!
//! - **Tick-driven engine**: every wait is an elapsed-time check, so a quit
//!   request is honored between any two frames
//! - **Progress survives restarts**: phase, session count and last completed
//!   date live in [`progressstore`] files
//! - **Constrained randomization**: change flags never run longer than the
//!   phase allows
//! - **Hardware behind traits**: display, pointer, feedback and clock are
//!   capabilities the engine drives
//!
//! # Modules
//!
//! - [`engine`] - Trial/block state machine and session context
//! - [`phase`] - Phase catalogue and per-phase rules
//! - [`randomize`] - Shuffles with a maximum run-length constraint
//! - [`stimulus`] - Stimulus pool and sample/comparison selection
//! - [`recorder`] - Tab-separated trial log
//! - [`capability`] - Display, pointer, feedback and clock traits
//! - [`sim`] - Headless rig driven by a simulated subject
//! - [`runner`] - Async frame loop with Ctrl-C handling
//! - [`summary`] - Per-block log summaries
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod capability;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod phase;
pub mod randomize;
pub mod recorder;
pub mod runner;
pub mod sim;
pub mod stimulus;
pub mod summary;

// Re-export commonly used types
pub use capability::{Axes, Clock, DisplaySurface, FeedbackDevice, ManualClock, PointerDevice, Region, Rig, ScaledClock, Screen};
pub use config::{Config, SimulationConfig};
pub use engine::{
    Block, FinishReason, Outcome, SessionContext, SessionSettings, TickOutcome, Trial, TrialEngine, TrialState,
    training_credit,
};
pub use error::{ControllerError, Result};
pub use phase::{CreditRule, Experiment, PhaseConfig, PhaseId, PhaseOverrides};
pub use randomize::{shuffle_with_max_run, shuffle_with_max_run_by};
pub use recorder::{LogSchema, TrialRecord, TrialRecorder, log_file_name, read_log};
pub use runner::{RunEnd, run_session, run_until};
pub use sim::{RandomSubject, Response, ScriptedSubject, SimHandle, SimStats, SubjectModel, simulated_rig};
pub use stimulus::{StimulusPool, StimulusRef};
pub use summary::{BlockSummary, summarize};
