//! trialctl - change-detection trial controller
//!
//! CLI entry point for running sessions and inspecting progress.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use progressstore::ProgressStore;
use trialctl::capability::{Clock, ScaledClock};
use trialctl::cli::{Cli, Command};
use trialctl::config::Config;
use trialctl::engine::{SessionContext, TrialEngine};
use trialctl::phase::{PhaseConfig, PhaseId};
use trialctl::recorder::read_log;
use trialctl::runner::{RunEnd, run_session};
use trialctl::sim::{RandomSubject, simulated_rig};
use trialctl::summary::summarize;

fn setup_logging(data_dir: &Path, level: tracing::Level) -> Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to a log file, stdout is for the operator
    let log_path = log_dir.join("trialctl.log");
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let level = config.log_level(cli.log_level.as_deref());
    setup_logging(&config.data_dir, level).context("Failed to setup logging")?;

    info!(
        "trialctl loaded config: subject={}, experiment={}, data-dir={}",
        config.subject,
        config.experiment,
        config.data_dir.display()
    );

    match cli.command {
        Command::Run {
            accuracy,
            miss_rate,
            speed,
            seed,
        } => {
            let mut config = config;
            if let Some(accuracy) = accuracy {
                config.simulation.accuracy = accuracy;
            }
            if let Some(miss_rate) = miss_rate {
                config.simulation.miss_rate = miss_rate;
            }
            if let Some(speed) = speed {
                config.simulation.speed = speed;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            cmd_run(&config).await
        }
        Command::Status => cmd_status(&config),
        Command::Summary { log } => cmd_summary(&log),
        Command::SetPhase { phase, count } => cmd_set_phase(&config, &phase, count),
    }
}

/// Run one session against the simulated subject
async fn cmd_run(config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let clock = Rc::new(ScaledClock::new(config.simulation.speed));
    let settings = config.to_settings();
    let ctx = SessionContext::open(&settings, clock.local_now()).context("Failed to open session")?;
    let log_path = ctx.recorder().path().to_path_buf();

    let subject_rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_os_rng(),
    };
    let sim = &config.simulation;
    let subject = RandomSubject::new(sim.accuracy, sim.miss_rate, sim.rt_min_ms, sim.rt_max_ms, subject_rng);
    let (rig, handle) = simulated_rig(Box::new(subject), clock);

    let phase = ctx.config().phase;
    println!(
        "{} {} session for {} in phase {}",
        "▶".cyan(),
        config.experiment,
        config.subject.cyan(),
        phase.to_string().yellow()
    );

    let mut engine = TrialEngine::start(ctx, rig).context("Failed to start session")?;
    let end = run_session(&mut engine, config.frame_rate_hz)
        .await
        .context("Session aborted")?;

    let stats = handle.stats();
    match end {
        RunEnd::Quit => println!("{} Session stopped by operator", "■".yellow()),
        RunEnd::Finished(reason) => println!("{} Session finished: {}", "✓".green(), reason),
    }
    println!("  Trial log: {}", log_path.display());
    println!("  Comparisons: {}", stats.comparisons);
    println!("  Rewards: {}", stats.rewards);
    Ok(())
}

/// Show persisted progress for the configured data directory
fn cmd_status(config: &Config) -> Result<()> {
    let store = ProgressStore::open(&config.data_dir).context("Failed to open progress store")?;
    let progress = store
        .load(config.experiment.initial_phase().as_str())
        .context("Failed to read progress")?;
    let phase: PhaseId = progress.phase.parse().context("Unknown persisted phase")?;
    let phase_config = PhaseConfig::for_phase(config.experiment, phase).context("Phase not in this experiment")?;
    let today = chrono::Local::now().date_naive();

    println!("Subject: {}", config.subject.cyan());
    println!("  Experiment: {}", config.experiment);
    println!("  Phase: {}", phase.to_string().yellow());
    println!(
        "  Sessions: {} / {}",
        progress.completed_session_count, phase_config.qualifying_sessions
    );
    match progress.last_completion_date {
        Some(date) => println!("  Last completed: {}", date.format(progressstore::DATE_FORMAT)),
        None => println!("  Last completed: {}", "never".dimmed()),
    }
    if progress.credited_on(today) {
        println!("  {}", "Already credited today".dimmed());
    }
    if progress.completed_session_count >= phase_config.qualifying_sessions {
        println!("{} Phase {} finished, set the next phase to continue", "✓".green(), phase);
    }
    Ok(())
}

/// Print per-block accuracy for a trial log
fn cmd_summary(log: &Path) -> Result<()> {
    let records = read_log(log).context(format!("Failed to read trial log {}", log.display()))?;
    let summaries = summarize(&records);
    if summaries.is_empty() {
        println!("No trials in {}", log.display());
        return Ok(());
    }

    for summary in summaries {
        let accuracy = summary
            .accuracy_percentage()
            .map(|a| format!("{:.1}%", a))
            .unwrap_or_else(|| "-".to_string());
        let mean_rt = summary
            .mean_rt_ms
            .map(|rt| format!("{:.0} ms", rt))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} block {}: {}/{} correct ({}), {} timeouts, mean RT {}, repeats {:.1}%",
            summary.phase.to_string().yellow(),
            summary.block.to_string().cyan(),
            summary.correct,
            summary.answered,
            accuracy,
            summary.timeouts,
            mean_rt,
            summary.repeat_rate() * 100.0
        );
    }
    Ok(())
}

/// Persist a new phase with a starting count and no completion date
fn cmd_set_phase(config: &Config, phase: &str, count: u32) -> Result<()> {
    let phase: PhaseId = phase.parse().context("Invalid phase")?;
    PhaseConfig::for_phase(config.experiment, phase).context("Phase not in this experiment")?;

    let store = ProgressStore::open(&config.data_dir).context("Failed to open progress store")?;
    store
        .write_progress(phase.as_str(), count, None)
        .context("Failed to write progress")?;

    info!(%phase, count, "Phase set");
    println!("{} Phase set to {} with {} sessions", "✓".green(), phase.to_string().yellow(), count);
    Ok(())
}
