//! Phase catalogue
//!
//! Every experimental phase is one `PhaseConfig` value consumed by the same
//! engine. The catalogue is closed: `Experiment` picks the table, `PhaseId`
//! picks the row.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ControllerError, Result};

/// Sample durations crossed with mask durations in evaluation phases
pub const SEARCH_DURATIONS_MS: [u64; 5] = [250, 500, 1000, 2500, 5000];
pub const MASK_DURATIONS_MS: [u64; 6] = [0, 50, 100, 250, 500, 1000];

/// Default response window
pub const RESPONSE_WINDOW_MS: u64 = 5000;

/// Fraction of a block that must be answered correctly for training credit
pub const ACCURACY_CRITERION: f64 = 0.8;

/// Qualifying sessions that complete a training phase
pub const TRAINING_QUALIFYING_SESSIONS: u32 = 2;

/// Stimuli cycled through during pre-training
pub const PRETRAINING_WINDOW: usize = 6;

/// Which experiment script family the phases belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Experiment {
    /// Change/no-change judgement with occlusion and difficulty tiers
    #[default]
    TwoChange,
    /// Sample/blank/test flicker paradigm
    Flicker,
}

impl Experiment {
    /// Phase assumed when no progress has been persisted
    pub fn initial_phase(self) -> PhaseId {
        match self {
            Self::TwoChange => PhaseId::PreTraining,
            Self::Flicker => PhaseId::Training,
        }
    }

    /// Phases this experiment runs, in order
    pub fn phases(self) -> &'static [PhaseId] {
        match self {
            Self::TwoChange => &[
                PhaseId::PreTraining,
                PhaseId::Training,
                PhaseId::Test1,
                PhaseId::Test2,
                PhaseId::Test3,
                PhaseId::Test4,
            ],
            Self::Flicker => &[PhaseId::Training, PhaseId::Test],
        }
    }

    /// Prefix used for trial log file names
    pub fn log_prefix(self) -> &'static str {
        match self {
            Self::TwoChange => "2change",
            Self::Flicker => "flicker",
        }
    }
}

impl std::fmt::Display for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.log_prefix())
    }
}

/// Experimental phase identifier, persisted verbatim in `num_sessions.txt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    PreTraining,
    Training,
    Test,
    Test1,
    Test2,
    Test3,
    Test4,
}

impl PhaseId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreTraining => "PreTraining",
            Self::Training => "Training",
            Self::Test => "Test",
            Self::Test1 => "Test1",
            Self::Test2 => "Test2",
            Self::Test3 => "Test3",
            Self::Test4 => "Test4",
        }
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseId {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "PreTraining" => Ok(Self::PreTraining),
            "Training" => Ok(Self::Training),
            "Test" => Ok(Self::Test),
            "Test1" => Ok(Self::Test1),
            "Test2" => Ok(Self::Test2),
            "Test3" => Ok(Self::Test3),
            "Test4" => Ok(Self::Test4),
            other => Err(ControllerError::config(format!("unknown phase '{}'", other))),
        }
    }
}

/// How a completed block changes the persisted session count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditRule {
    /// One session per day for a block meeting the accuracy criterion; a
    /// failed block takes back credit earned earlier the same day
    Accuracy,
    /// The count is the index of the last completed block
    BlockIndex,
    /// One session per day for completing any block; block numbering starts
    /// over with every run
    Daily,
}

/// Sample/mask durations for each trial of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingRule {
    /// Same durations on every trial
    Fixed { sample_ms: u64, mask_ms: u64 },
    /// Full crossing of sample and mask durations, repeated `reps` times,
    /// shuffled once per block
    Grid {
        sample_ms: Vec<u64>,
        mask_ms: Vec<u64>,
        reps: usize,
    },
}

impl TimingRule {
    /// Unshuffled list of `(sample_ms, mask_ms)` pairs for one block
    pub fn expand(&self, block_length: usize) -> Vec<(u64, u64)> {
        match self {
            Self::Fixed { sample_ms, mask_ms } => vec![(*sample_ms, *mask_ms); block_length],
            Self::Grid {
                sample_ms,
                mask_ms,
                reps,
            } => (0..*reps)
                .flat_map(|_| sample_ms.iter().flat_map(|&s| mask_ms.iter().map(move |&m| (s, m))))
                .collect(),
        }
    }
}

/// How the changed flag of each trial is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeRule {
    /// Half changed, half unchanged, reshuffled per block with bounded runs
    Balanced { max_run: usize },
    /// Independent fair coin per trial
    CoinFlip,
}

/// How the sample index is picked for a new trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRule {
    /// Walk the shuffled pool in order
    Sequential,
    /// Walk only the first `size` entries of the pool
    Window { size: usize },
}

/// How the comparison is picked on changed trials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonRule {
    /// A different stimulus from the pool
    OtherStimulus,
    /// The same stimulus with the opposite occlusion state
    OcclusionSwap,
    /// The same stimulus at a difficulty tier chosen by block number
    DifficultyTier { tiers: usize },
}

/// Everything the engine needs to know about one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseConfig {
    pub phase: PhaseId,
    pub experiment: Experiment,
    pub block_length: usize,
    pub response_window_ms: u64,
    /// Blank screen after an incorrect selection
    pub penalty_ms: u64,
    pub timing: TimingRule,
    pub change_rule: ChangeRule,
    /// Pair each changed flag with an alternating sample-occluded flag
    pub occlusion: bool,
    pub sample_rule: SampleRule,
    pub comparison_rule: ComparisonRule,
    /// Reshuffle the pool every N trials within a block
    pub pool_reshuffle_every: Option<usize>,
    /// Glob patterns relative to the stimuli directory, one per variant;
    /// index 0 is the original image
    pub stimulus_globs: Vec<String>,
    pub credit_rule: CreditRule,
    /// Persisted count at which the phase is complete
    pub qualifying_sessions: u32,
    /// Evaluation block index at which the run stops
    pub session_cap: Option<u32>,
    pub accuracy_criterion: f64,
}

impl PhaseConfig {
    /// Catalogue entry for `phase` in `experiment`
    pub fn for_phase(experiment: Experiment, phase: PhaseId) -> Result<Self> {
        debug!(%experiment, %phase, "PhaseConfig::for_phase: called");
        if !experiment.phases().contains(&phase) {
            return Err(ControllerError::config(format!(
                "phase {} is not part of the {} experiment",
                phase, experiment
            )));
        }
        let config = match experiment {
            Experiment::TwoChange => two_change(phase),
            Experiment::Flicker => flicker(phase),
        };
        Ok(config)
    }

    /// Correct answers needed in one block for training credit
    pub fn passes(&self, correct: usize) -> bool {
        correct as f64 >= self.accuracy_criterion * self.block_length as f64
    }

    /// Check internal consistency before any trial runs
    pub fn validate(&self) -> Result<()> {
        if self.block_length == 0 {
            return Err(ControllerError::config("block length must be positive"));
        }
        if self.response_window_ms == 0 {
            return Err(ControllerError::config("response window must be positive"));
        }
        let timings = self.timing.expand(self.block_length).len();
        if timings < self.block_length {
            return Err(ControllerError::config(format!(
                "{} timing combinations cannot cover a block of {} trials",
                timings, self.block_length
            )));
        }
        if self.stimulus_globs.is_empty() {
            return Err(ControllerError::config("no stimulus folders configured"));
        }
        let variants_needed = match self.comparison_rule {
            ComparisonRule::OtherStimulus => 1,
            ComparisonRule::OcclusionSwap => 2,
            ComparisonRule::DifficultyTier { tiers } => tiers + 1,
        };
        if self.stimulus_globs.len() < variants_needed {
            return Err(ControllerError::config(format!(
                "{} comparison needs {} stimulus folders, {} configured",
                self.phase,
                variants_needed,
                self.stimulus_globs.len()
            )));
        }
        if let SampleRule::Window { size } = self.sample_rule
            && size < 2
        {
            return Err(ControllerError::config("sample window must hold at least two stimuli"));
        }
        Ok(())
    }
}

/// Site-specific adjustments layered over the catalogue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseOverrides {
    #[serde(rename = "block-length")]
    pub block_length: Option<usize>,

    #[serde(rename = "response-window-ms")]
    pub response_window_ms: Option<u64>,

    #[serde(rename = "penalty-ms")]
    pub penalty_ms: Option<u64>,
}

impl PhaseOverrides {
    pub fn apply(&self, config: &mut PhaseConfig) {
        if let Some(block_length) = self.block_length {
            config.block_length = block_length;
        }
        if let Some(window) = self.response_window_ms {
            config.response_window_ms = window;
        }
        if let Some(penalty) = self.penalty_ms {
            config.penalty_ms = penalty;
        }
    }
}

fn base(experiment: Experiment, phase: PhaseId) -> PhaseConfig {
    PhaseConfig {
        phase,
        experiment,
        block_length: 120,
        response_window_ms: RESPONSE_WINDOW_MS,
        penalty_ms: 20_000,
        timing: TimingRule::Grid {
            sample_ms: SEARCH_DURATIONS_MS.to_vec(),
            mask_ms: MASK_DURATIONS_MS.to_vec(),
            reps: 4,
        },
        change_rule: ChangeRule::Balanced { max_run: 3 },
        occlusion: false,
        sample_rule: SampleRule::Sequential,
        comparison_rule: ComparisonRule::OtherStimulus,
        pool_reshuffle_every: None,
        stimulus_globs: Vec::new(),
        credit_rule: CreditRule::BlockIndex,
        qualifying_sessions: 40,
        session_cap: Some(40),
        accuracy_criterion: ACCURACY_CRITERION,
    }
}

fn globs(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn training(mut config: PhaseConfig, sample_ms: u64) -> PhaseConfig {
    config.timing = TimingRule::Fixed { sample_ms, mask_ms: 0 };
    config.credit_rule = CreditRule::Accuracy;
    config.qualifying_sessions = TRAINING_QUALIFYING_SESSIONS;
    config.session_cap = None;
    config
}

fn two_change(phase: PhaseId) -> PhaseConfig {
    let config = base(Experiment::TwoChange, phase);
    match phase {
        PhaseId::PreTraining => PhaseConfig {
            sample_rule: SampleRule::Window {
                size: PRETRAINING_WINDOW,
            },
            pool_reshuffle_every: Some(PRETRAINING_WINDOW),
            stimulus_globs: globs(&["phase0_stimuli/*.gif"]),
            ..training(config, 1000)
        },
        PhaseId::Training => PhaseConfig {
            stimulus_globs: globs(&["phase1_stimuli/*.gif"]),
            ..training(config, 1000)
        },
        PhaseId::Test2 => PhaseConfig {
            occlusion: true,
            comparison_rule: ComparisonRule::OcclusionSwap,
            stimulus_globs: globs(&["phase3_stimuli/original/*.GIF", "phase3_stimuli/occluded/*.GIF"]),
            ..config
        },
        PhaseId::Test3 => PhaseConfig {
            comparison_rule: ComparisonRule::DifficultyTier { tiers: 5 },
            stimulus_globs: globs(&[
                "phase4_stimuli/original/*.jpg",
                "phase4_stimuli/changed1/*.jpg",
                "phase4_stimuli/changed2/*.jpg",
                "phase4_stimuli/changed3/*.jpg",
                "phase4_stimuli/changed4/*.jpg",
                "phase4_stimuli/changed5/*.jpg",
            ]),
            ..config
        },
        PhaseId::Test4 => PhaseConfig {
            comparison_rule: ComparisonRule::DifficultyTier { tiers: 3 },
            stimulus_globs: globs(&[
                "phase5_stimuli/original/*.jpg",
                "phase5_stimuli/changed1/*.jpg",
                "phase5_stimuli/changed2/*.jpg",
                "phase5_stimuli/changed3/*.jpg",
            ]),
            ..config
        },
        _ => PhaseConfig {
            stimulus_globs: globs(&["phase2_stimuli/*.bmp"]),
            ..config
        },
    }
}

fn flicker(phase: PhaseId) -> PhaseConfig {
    let config = PhaseConfig {
        block_length: 90,
        penalty_ms: 3000,
        timing: TimingRule::Grid {
            sample_ms: SEARCH_DURATIONS_MS.to_vec(),
            mask_ms: MASK_DURATIONS_MS.to_vec(),
            reps: 3,
        },
        change_rule: ChangeRule::CoinFlip,
        qualifying_sessions: 20,
        session_cap: Some(20),
        ..base(Experiment::Flicker, phase)
    };
    match phase {
        PhaseId::Training => PhaseConfig {
            stimulus_globs: globs(&["phase1_stimuli/*.gif"]),
            ..training(config, 5000)
        },
        _ => PhaseConfig {
            stimulus_globs: globs(&["phase2_stimuli/*.GIF"]),
            credit_rule: CreditRule::Daily,
            session_cap: None,
            ..config
        },
    }
}
