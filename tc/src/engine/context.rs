//! SessionContext - everything one run needs besides the hardware

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use progressstore::{ProgressStore, SessionProgress};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{ControllerError, Result};
use crate::phase::{Experiment, PhaseConfig, PhaseId, PhaseOverrides};
use crate::recorder::{LogSchema, TrialRecorder, log_file_name};
use crate::stimulus::StimulusPool;

use super::sequences::BlockSequences;

/// Where a run reads and writes its files
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub experiment: Experiment,
    pub subject: String,
    /// Progress files and trial logs
    pub data_dir: PathBuf,
    /// Root the phase stimulus globs are resolved against
    pub stimuli_dir: PathBuf,
    pub overrides: PhaseOverrides,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

/// Per-run state: persisted progress as loaded, the phase table, the pool,
/// the block sequences and the trial log
///
/// Progress is read once here; the in-memory copy is authoritative until the
/// engine writes back at a block boundary.
pub struct SessionContext {
    pub(crate) config: PhaseConfig,
    pub(crate) subject: String,
    pub(crate) store: ProgressStore,
    /// Progress as loaded at process start
    pub(crate) progress: SessionProgress,
    pub(crate) today: NaiveDate,
    pub(crate) pool: StimulusPool,
    pub(crate) sequences: BlockSequences,
    pub(crate) recorder: TrialRecorder,
    pub(crate) rng: StdRng,
}

impl SessionContext {
    /// Load progress from disk, resolve the phase, load stimuli and open a
    /// new trial log
    pub fn open(settings: &SessionSettings, now: NaiveDateTime) -> Result<Self> {
        debug!(?settings, %now, "SessionContext::open: called");
        let store = ProgressStore::open(&settings.data_dir)?;
        let progress = store.load(settings.experiment.initial_phase().as_str())?;
        let phase: PhaseId = progress.phase.parse()?;

        let mut config = PhaseConfig::for_phase(settings.experiment, phase)?;
        settings.overrides.apply(&mut config);
        config.validate()?;

        let pool = StimulusPool::load(&settings.stimuli_dir, &config.stimulus_globs)?;
        let log_name = log_file_name(settings.experiment, &settings.subject, now);
        let recorder = TrialRecorder::create_unique(
            &settings.data_dir,
            &log_name,
            LogSchema::for_experiment(settings.experiment),
        )?;

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self::from_parts(config, &settings.subject, store, pool, recorder, now.date(), rng)
    }

    /// Assemble a context from already-built parts; progress is loaded from
    /// `store` and must belong to `config.phase`
    pub fn from_parts(
        config: PhaseConfig,
        subject: &str,
        store: ProgressStore,
        pool: StimulusPool,
        recorder: TrialRecorder,
        today: NaiveDate,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        let progress = store.load(config.phase.as_str())?;
        if progress.phase != config.phase.as_str() {
            return Err(ControllerError::config(format!(
                "progress is at phase {} but the session was configured for {}",
                progress.phase, config.phase
            )));
        }
        info!(
            phase = %config.phase,
            subject,
            sessions = progress.completed_session_count,
            credited_today = progress.credited_on(today),
            "Session context ready"
        );
        Ok(Self {
            sequences: BlockSequences::new(&config),
            config,
            subject: subject.to_string(),
            store,
            progress,
            today,
            pool,
            recorder,
            rng,
        })
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    pub fn recorder(&self) -> &TrialRecorder {
        &self.recorder
    }
}
