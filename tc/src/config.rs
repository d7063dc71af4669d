//! trialctl configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::SessionSettings;
use crate::phase::{Experiment, PhaseOverrides};

/// Main trialctl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subject identifier written to every log row
    pub subject: String,

    pub experiment: Experiment,

    /// Progress files, trial logs and the controller log
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Root of the per-phase stimulus folders
    #[serde(rename = "stimuli-dir")]
    pub stimuli_dir: PathBuf,

    /// Engine ticks per second
    #[serde(rename = "frame-rate-hz")]
    pub frame_rate_hz: u32,

    /// Controller log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Fixed seed for reproducible sessions
    pub seed: Option<u64>,

    /// Adjustments layered over the phase catalogue
    pub overrides: PhaseOverrides,

    /// Simulated subject used by `tc run`
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subject: "subject".to_string(),
            experiment: Experiment::default(),
            data_dir: PathBuf::from("data"),
            stimuli_dir: PathBuf::from("stimuli"),
            frame_rate_hz: 60,
            log_level: None,
            seed: None,
            overrides: PhaseOverrides::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(eyre::eyre!("subject must not be empty"));
        }
        if self.subject.contains(['/', '\\', '\t', '\n']) {
            return Err(eyre::eyre!("subject '{}' contains path or log separators", self.subject));
        }
        if self.frame_rate_hz == 0 || self.frame_rate_hz > 1000 {
            return Err(eyre::eyre!("frame-rate-hz must be within 1..=1000, got {}", self.frame_rate_hz));
        }
        if self.overrides.block_length == Some(0) {
            return Err(eyre::eyre!("overrides.block-length must be positive"));
        }
        if self.overrides.response_window_ms == Some(0) {
            return Err(eyre::eyre!("overrides.response-window-ms must be positive"));
        }
        if let Some(level) = &self.log_level {
            level
                .parse::<tracing::Level>()
                .map_err(|_| eyre::eyre!("unknown log-level '{}'", level))?;
        }
        self.simulation.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: ./trialctl.yml
        let local_config = PathBuf::from("trialctl.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/trialctl/trialctl.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("trialctl").join("trialctl.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Log level to install: explicit flag, then config, then INFO
    pub fn log_level(&self, flag: Option<&str>) -> tracing::Level {
        flag.or(self.log_level.as_deref())
            .and_then(|level| level.parse().ok())
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn to_settings(&self) -> SessionSettings {
        SessionSettings {
            experiment: self.experiment,
            subject: self.subject.clone(),
            data_dir: self.data_dir.clone(),
            stimuli_dir: self.stimuli_dir.clone(),
            overrides: self.overrides.clone(),
            seed: self.seed,
        }
    }
}

/// Simulated subject parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Probability of a correct choice when answering
    pub accuracy: f64,

    /// Probability of letting the response window run out
    #[serde(rename = "miss-rate")]
    pub miss_rate: f64,

    #[serde(rename = "rt-min-ms")]
    pub rt_min_ms: u64,

    #[serde(rename = "rt-max-ms")]
    pub rt_max_ms: u64,

    /// Clock speed-up relative to real time
    pub speed: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            accuracy: 0.85,
            miss_rate: 0.05,
            rt_min_ms: 400,
            rt_max_ms: 2500,
            speed: 1.0,
        }
    }
}

impl SimulationConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(eyre::eyre!("simulation.accuracy must be within 0..=1, got {}", self.accuracy));
        }
        if !(0.0..=1.0).contains(&self.miss_rate) {
            return Err(eyre::eyre!("simulation.miss-rate must be within 0..=1, got {}", self.miss_rate));
        }
        if self.rt_min_ms > self.rt_max_ms {
            return Err(eyre::eyre!(
                "simulation.rt-min-ms ({}) exceeds rt-max-ms ({})",
                self.rt_min_ms,
                self.rt_max_ms
            ));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(eyre::eyre!("simulation.speed must be positive, got {}", self.speed));
        }
        Ok(())
    }
}
