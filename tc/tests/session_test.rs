//! Integration tests for trialctl
//!
//! Whole sessions driven through the engine with a manual clock and a
//! scripted subject, checked against the persisted progress and trial log.

use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use progressstore::ProgressStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;
use trialctl::capability::{ManualClock, ScaledClock};
use trialctl::engine::{FinishReason, SessionContext, SessionSettings, TickOutcome, TrialEngine, TrialState};
use trialctl::phase::{Experiment, PhaseConfig, PhaseId, PhaseOverrides};
use trialctl::recorder::{LogSchema, TrialRecord, TrialRecorder, read_log};
use trialctl::runner::{RunEnd, run_until};
use trialctl::sim::{Response, ScriptedSubject, simulated_rig};
use trialctl::stimulus::{StimulusPool, StimulusRef};
use trialctl::{Outcome, SubjectModel};

const TICK_MS: u64 = 50;
const MAX_TICKS: usize = 500_000;

fn origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn today() -> NaiveDate {
    origin().date()
}

fn pool(size: usize) -> StimulusPool {
    let entries = (0..size)
        .map(|i| vec![StimulusRef::new(format!("s{:02}", i), format!("/stimuli/s{:02}.gif", i))])
        .collect();
    StimulusPool::from_entries(entries).unwrap()
}

/// Pool whose entries carry one image per variant folder, named
/// `{variant}/sNN`
fn variant_pool(size: usize, variants: &[&str]) -> StimulusPool {
    let entries = (0..size)
        .map(|i| {
            variants
                .iter()
                .map(|v| StimulusRef::new(format!("{}/s{:02}", v, i), format!("/stimuli/{}/s{:02}.jpg", v, i)))
                .collect()
        })
        .collect();
    StimulusPool::from_entries(entries).unwrap()
}

/// Split a `{variant}/sNN` name into its parts
fn split_name(name: &str) -> (&str, &str) {
    name.split_once('/').unwrap()
}

fn short_config(experiment: Experiment, phase: PhaseId) -> PhaseConfig {
    let mut config = PhaseConfig::for_phase(experiment, phase).unwrap();
    config.block_length = 8;
    config.penalty_ms = 200;
    config.response_window_ms = 500;
    config
}

fn training_config(experiment: Experiment) -> PhaseConfig {
    short_config(experiment, PhaseId::Training)
}

struct Session {
    _temp: Option<TempDir>,
    clock: ManualClock,
    engine: TrialEngine,
    store: ProgressStore,
}

impl Session {
    fn log(&self) -> Vec<TrialRecord> {
        read_log(self.engine.context().recorder().path()).unwrap()
    }

    /// Tick with the clock advancing until `done` holds or the engine finishes
    fn drive_until(&mut self, mut done: impl FnMut(&TrialEngine) -> bool) -> Option<FinishReason> {
        for _ in 0..MAX_TICKS {
            if done(&self.engine) {
                return None;
            }
            match self.engine.tick().unwrap() {
                TickOutcome::Continue => self.clock.advance(TICK_MS),
                TickOutcome::Finished(reason) => return Some(reason),
            }
        }
        panic!("session did not reach the expected state");
    }

    /// Run until the block after `block` has opened
    fn finish_block(&mut self, block: u32) -> Option<FinishReason> {
        self.drive_until(|engine| engine.block().index > block)
    }

    /// Logged rows of `block`, in trial order
    fn block_rows(&self, block: u32) -> Vec<TrialRecord> {
        let mut rows: Vec<_> = self.log().into_iter().filter(|r| r.block == block).collect();
        rows.sort_by_key(|r| r.trial);
        rows
    }
}

fn seed_store(data: &Path, phase: PhaseId, count: u32, last: Option<NaiveDate>) {
    let store = ProgressStore::open(data).unwrap();
    store.write_count(phase.as_str(), count).unwrap();
    store.write_last_completed(last).unwrap();
}

/// Start an engine on the progress files in `data`
fn start_at(data: &Path, config: PhaseConfig, pool_size: usize, subject: impl SubjectModel + 'static, seed: u64) -> Session {
    start_with_pool(data, config, pool(pool_size), subject, seed)
}

fn start_with_pool(
    data: &Path,
    config: PhaseConfig,
    pool: StimulusPool,
    subject: impl SubjectModel + 'static,
    seed: u64,
) -> Session {
    let store = ProgressStore::open(data).unwrap();
    let log_path = data.join(format!("run_{}.tsv", seed));
    let recorder = TrialRecorder::create(&log_path, LogSchema::for_experiment(config.experiment)).unwrap();
    let ctx = SessionContext::from_parts(
        config,
        "ham",
        store.clone(),
        pool,
        recorder,
        today(),
        StdRng::seed_from_u64(seed),
    )
    .unwrap();

    let clock = ManualClock::new(origin());
    let (rig, _handle) = simulated_rig(Box::new(subject), Rc::new(clock.clone()));
    let engine = TrialEngine::start(ctx, rig).unwrap();
    Session {
        _temp: None,
        clock,
        engine,
        store,
    }
}

fn start_in(
    temp: TempDir,
    config: PhaseConfig,
    pool_size: usize,
    subject: impl SubjectModel + 'static,
    seed: u64,
    progress: Option<(u32, Option<NaiveDate>)>,
) -> Session {
    let data = temp.path().join("data");
    if let Some((count, last)) = progress {
        seed_store(&data, config.phase, count, last);
    }
    let mut session = start_at(&data, config, pool_size, subject, seed);
    session._temp = Some(temp);
    session
}

/// Start on a fresh data directory seeded with `count` and `last`, using
/// `pool` as the stimulus pool
fn start_seeded(
    config: PhaseConfig,
    pool: StimulusPool,
    progress: (u32, Option<NaiveDate>),
    subject: impl SubjectModel + 'static,
    seed: u64,
) -> Session {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    seed_store(&data, config.phase, progress.0, progress.1);
    let mut session = start_with_pool(&data, config, pool, subject, seed);
    session._temp = Some(temp);
    session
}

fn start_session(config: PhaseConfig, pool_size: usize, subject: impl SubjectModel + 'static, seed: u64) -> Session {
    start_in(TempDir::new().unwrap(), config, pool_size, subject, seed, None)
}

fn with_progress(
    config: PhaseConfig,
    count: u32,
    last: Option<NaiveDate>,
    subject: impl SubjectModel + 'static,
) -> Session {
    start_in(TempDir::new().unwrap(), config, 10, subject, 7, Some((count, last)))
}

fn all_correct() -> ScriptedSubject {
    ScriptedSubject::repeating(Response::correct(100))
}

fn correct_then_wrong(correct: usize, wrong: usize) -> ScriptedSubject {
    let script = std::iter::repeat_n(Response::correct(100), correct).chain(std::iter::repeat_n(Response::incorrect(100), wrong));
    ScriptedSubject::new(script, Response::correct(100))
}

// =============================================================================
// Training credit
// =============================================================================

#[test]
fn test_full_block_correct_credits_session() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, all_correct(), 1);
    assert_eq!(session.finish_block(1), None);

    let progress = session.store.load("Training").unwrap();
    assert_eq!(progress.phase, "Training");
    assert_eq!(progress.completed_session_count, 1);
    assert_eq!(progress.last_completion_date, Some(today()));

    let rows: Vec<_> = session.log().into_iter().filter(|r| r.block == 1).collect();
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r.outcome == Outcome::Correct));
    assert!(rows.iter().all(|r| r.reaction_time_ms >= 100 && r.reaction_time_ms < 500));
}

#[test]
fn test_failed_block_after_credit_today_takes_credit_back() {
    let mut session = with_progress(training_config(Experiment::TwoChange), 1, Some(today()), correct_then_wrong(5, 3));
    let block = session.engine.block().index;
    assert_eq!(block, 2);
    assert_eq!(session.finish_block(block), None);

    let progress = session.store.load("Training").unwrap();
    assert_eq!(progress.completed_session_count, 0);
    assert_eq!(progress.last_completion_date, Some(today()));

    let rows = session.block_rows(block);
    assert_eq!(rows.len(), 8);
    assert_eq!(rows.iter().filter(|r| r.outcome == Outcome::Correct).count(), 5);
}

#[test]
fn test_failed_block_without_credit_today_holds_count() {
    let yesterday = today().pred_opt().unwrap();
    let mut session = with_progress(training_config(Experiment::TwoChange), 1, Some(yesterday), correct_then_wrong(5, 3));
    let block = session.engine.block().index;
    assert_eq!(session.finish_block(block), None);

    let progress = session.store.load("Training").unwrap();
    assert_eq!(progress.completed_session_count, 1);
    assert_eq!(progress.last_completion_date, Some(today()));
    assert_eq!(session.block_rows(block).len(), 8);
}

#[test]
fn test_same_day_rerun_never_double_credits() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");

    // First run of the day earns the credit
    let mut first = start_at(&data, training_config(Experiment::TwoChange), 10, all_correct(), 2);
    let block = first.engine.block().index;
    assert_eq!(first.finish_block(block), None);
    first.engine.shutdown().unwrap();
    assert_eq!(first.store.load("Training").unwrap().completed_session_count, 1);

    // A second run the same day passes again without adding credit
    let mut second = start_at(&data, training_config(Experiment::TwoChange), 10, all_correct(), 3);
    assert_eq!(second.engine.context().progress().completed_session_count, 1);
    let block = second.engine.block().index;
    assert_eq!(second.finish_block(block), None);

    let rows = second.block_rows(block);
    assert_eq!(rows.len(), 8);
    assert!(rows.iter().all(|r| r.outcome == Outcome::Correct));
    let progress = second.store.load("Training").unwrap();
    assert_eq!(progress.completed_session_count, 1);
    assert_eq!(progress.last_completion_date, Some(today()));
}

#[test]
fn test_second_qualifying_session_finishes_phase() {
    let yesterday = today().pred_opt().unwrap();
    let mut session = with_progress(training_config(Experiment::TwoChange), 1, Some(yesterday), all_correct());

    let block = session.engine.block().index;
    let reason = session.finish_block(block);
    assert_eq!(reason, Some(FinishReason::QualifyingSessionsReached));
    assert_eq!(session.store.load("Training").unwrap().completed_session_count, 2);
    assert_eq!(session.engine.finished(), Some(FinishReason::QualifyingSessionsReached));
}

#[test]
fn test_already_qualified_runs_nothing() {
    let mut session = with_progress(training_config(Experiment::TwoChange), 2, None, all_correct());

    assert_eq!(session.engine.finished(), Some(FinishReason::AlreadyQualified));
    assert_eq!(session.engine.tick().unwrap(), TickOutcome::Finished(FinishReason::AlreadyQualified));
    assert!(session.engine.current_trial().is_none());
    assert!(session.log().is_empty());
}

// =============================================================================
// Trial mechanics
// =============================================================================

#[test]
fn test_timeout_logs_once_and_repeats_slot_with_new_sample() {
    let subject = ScriptedSubject::new([Response::Withhold], Response::correct(100));
    let mut session = start_session(training_config(Experiment::TwoChange), 10, subject, 4);

    session.drive_until(|engine| engine.context().recorder().rows() >= 2);
    let rows = session.log();
    let (missed, retry) = (&rows[0], &rows[1]);

    assert_eq!(missed.outcome, Outcome::TimedOut);
    assert_eq!(missed.reaction_time_ms, 500);
    assert_eq!(retry.outcome, Outcome::Correct);
    assert_eq!(retry.block, missed.block);
    assert_eq!(retry.trial, missed.trial);
    assert_eq!(retry.changed, missed.changed);
    assert_eq!(retry.search_duration_ms, missed.search_duration_ms);
    assert_ne!(retry.sample, missed.sample);
    assert_eq!(rows.iter().filter(|r| r.outcome == Outcome::TimedOut).count(), 1);
}

#[test]
fn test_comparison_matches_sample_only_on_unchanged_trials() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, all_correct(), 5);
    session.finish_block(1);

    let rows: Vec<_> = session.log().into_iter().filter(|r| r.block == 1).collect();
    assert_eq!(rows.iter().filter(|r| r.changed).count(), 4);
    for row in &rows {
        if row.changed {
            assert_ne!(row.comparison, row.sample, "trial {}", row.trial);
        } else {
            assert_eq!(row.comparison, row.sample, "trial {}", row.trial);
        }
    }
}

#[test]
fn test_each_pool_entry_sampled_once_per_block() {
    let mut session = start_session(training_config(Experiment::TwoChange), 8, all_correct(), 6);
    session.finish_block(1);

    let samples: HashSet<String> = session
        .log()
        .into_iter()
        .filter(|r| r.block == 1)
        .map(|r| r.sample)
        .collect();
    assert_eq!(samples.len(), 8);
}

#[test]
fn test_incorrect_choice_holds_penalty_before_next_trial() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, correct_then_wrong(0, 1), 8);

    session.drive_until(|engine| engine.context().recorder().rows() >= 1);
    assert_eq!(session.log()[0].outcome, Outcome::Incorrect);

    // Penalty lasts 200 ms; the trial number must not move before it ends
    let first = session.engine.current_trial().unwrap().trial_number;
    session.engine.tick().unwrap();
    assert_eq!(session.engine.current_trial().unwrap().trial_number, first);
    session.drive_until(|engine| engine.current_trial().is_some_and(|t| t.trial_number > first));
}

// =============================================================================
// Evaluation phases
// =============================================================================

#[test]
fn test_evaluation_persists_block_index_and_stops_at_cap() {
    let mut config = PhaseConfig::for_phase(Experiment::TwoChange, PhaseId::Test1).unwrap();
    config.block_length = 8;
    config.response_window_ms = 500;
    config.session_cap = Some(3);
    let mut session = start_in(TempDir::new().unwrap(), config, 10, all_correct(), 9, Some((1, None)));

    assert_eq!(session.engine.block().index, 2);
    assert_eq!(session.finish_block(2), None);
    assert_eq!(session.store.load("Test1").unwrap().completed_session_count, 2);

    let reason = session.finish_block(3);
    assert_eq!(reason, Some(FinishReason::SessionCapReached));
    let progress = session.store.load("Test1").unwrap();
    assert_eq!(progress.completed_session_count, 3);
    assert_eq!(progress.last_completion_date, None);
}

#[test]
fn test_occlusion_phase_swaps_variant_of_the_same_stimulus() {
    let config = short_config(Experiment::TwoChange, PhaseId::Test2);
    let mut session = start_seeded(config, variant_pool(10, &["original", "occluded"]), (0, None), all_correct(), 14);
    assert_eq!(session.engine.block().index, 1);
    session.finish_block(1);

    let rows = session.block_rows(1);
    assert_eq!(rows.len(), 8);
    for row in &rows {
        let occluded = row.sample_occluded.unwrap();
        let (sample_variant, sample_stem) = split_name(&row.sample);
        assert_eq!(sample_variant, if occluded { "occluded" } else { "original" }, "trial {}", row.trial);
        if row.changed {
            let (comparison_variant, comparison_stem) = split_name(&row.comparison);
            assert_eq!(comparison_stem, sample_stem, "trial {}", row.trial);
            assert_ne!(comparison_variant, sample_variant, "trial {}", row.trial);
        } else {
            assert_eq!(row.comparison, row.sample, "trial {}", row.trial);
        }
    }
    assert_eq!(rows.iter().filter(|r| r.sample_occluded == Some(true)).count(), 4);
    assert_eq!(rows.iter().filter(|r| r.changed && r.sample_occluded == Some(true)).count(), 2);
}

#[test]
fn test_difficulty_tier_follows_block_index_across_restart() {
    let tiers = ["original", "changed1", "changed2", "changed3", "changed4", "changed5"];
    let config = short_config(Experiment::TwoChange, PhaseId::Test3);
    let mut session = start_seeded(config, variant_pool(10, &tiers), (6, None), all_correct(), 15);

    // Six blocks were run before; this run opens block 7, tier 2
    assert_eq!(session.engine.block().index, 7);
    assert_eq!(session.finish_block(7), None);
    assert_eq!(session.finish_block(8), None);
    assert_eq!(session.store.load("Test3").unwrap().completed_session_count, 8);

    for (block, tier) in [(7, "changed2"), (8, "changed3")] {
        let rows = session.block_rows(block);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows.iter().filter(|r| r.changed).count(), 4);
        for row in rows.iter().filter(|r| r.changed) {
            let (sample_variant, sample_stem) = split_name(&row.sample);
            let (comparison_variant, comparison_stem) = split_name(&row.comparison);
            assert_eq!(sample_variant, "original");
            assert_eq!(comparison_variant, tier, "block {} trial {}", block, row.trial);
            assert_eq!(comparison_stem, sample_stem);
        }
    }
}

#[test]
fn test_three_tier_phase_wraps_by_block_index() {
    let tiers = ["original", "changed1", "changed2", "changed3"];
    let config = short_config(Experiment::TwoChange, PhaseId::Test4);
    let mut session = start_seeded(config, variant_pool(10, &tiers), (4, None), all_correct(), 16);

    assert_eq!(session.engine.block().index, 5);
    session.finish_block(5);
    let rows = session.block_rows(5);
    assert_eq!(rows.len(), 8);
    assert!(
        rows.iter()
            .filter(|r| r.changed)
            .all(|r| split_name(&r.comparison).0 == "changed2")
    );
}

#[test]
fn test_pretraining_walks_a_window_reshuffled_every_six_trials() {
    let mut config = short_config(Experiment::TwoChange, PhaseId::PreTraining);
    config.block_length = 12;
    let mut session = start_seeded(config, pool(40), (0, None), all_correct(), 17);

    assert_eq!(session.engine.block().index, 1);
    session.finish_block(1);
    let rows = session.block_rows(1);
    assert_eq!(rows.len(), 12);

    let first: HashSet<&str> = rows[..6].iter().map(|r| r.sample.as_str()).collect();
    let second: HashSet<&str> = rows[6..].iter().map(|r| r.sample.as_str()).collect();
    assert_eq!(first.len(), 6);
    assert_eq!(second.len(), 6);
    assert_ne!(first, second);
}

// =============================================================================
// Daily-credited evaluation
// =============================================================================

#[test]
fn test_daily_phase_credits_once_per_day_and_restarts_block_numbers() {
    let config = short_config(Experiment::Flicker, PhaseId::Test);
    let yesterday = today().pred_opt().unwrap();
    let mut session = start_seeded(config, pool(10), (3, Some(yesterday)), all_correct(), 18);

    assert_eq!(session.engine.block().index, 1);
    assert_eq!(session.finish_block(1), None);
    assert_eq!(session.finish_block(2), None);

    let progress = session.store.load("Test").unwrap();
    assert_eq!(progress.completed_session_count, 4);
    assert_eq!(progress.last_completion_date, Some(today()));
    assert_eq!(session.block_rows(1).len(), 8);
    assert_eq!(session.block_rows(2).len(), 8);
}

#[test]
fn test_daily_phase_counts_blocks_regardless_of_accuracy() {
    let config = short_config(Experiment::Flicker, PhaseId::Test);
    let yesterday = today().pred_opt().unwrap();
    let subject = ScriptedSubject::repeating(Response::incorrect(100));
    let mut session = start_seeded(config, pool(10), (3, Some(yesterday)), subject, 19);

    assert_eq!(session.finish_block(1), None);
    assert_eq!(session.store.load("Test").unwrap().completed_session_count, 4);
}

#[test]
fn test_daily_phase_already_credited_today_holds_count() {
    let config = short_config(Experiment::Flicker, PhaseId::Test);
    let mut session = start_seeded(config, pool(10), (3, Some(today())), all_correct(), 20);

    assert_eq!(session.engine.block().index, 1);
    session.finish_block(1);
    assert_eq!(session.store.load("Test").unwrap().completed_session_count, 3);
}

#[test]
fn test_daily_phase_finishes_after_twenty_credited_days() {
    let config = short_config(Experiment::Flicker, PhaseId::Test);
    let yesterday = today().pred_opt().unwrap();
    let mut session = start_seeded(config, pool(10), (19, Some(yesterday)), all_correct(), 21);

    assert_eq!(session.engine.block().index, 1);
    assert_eq!(session.finish_block(1), Some(FinishReason::QualifyingSessionsReached));
    assert_eq!(session.store.load("Test").unwrap().completed_session_count, 20);
}

#[test]
fn test_flicker_log_has_no_occlusion_column() {
    let mut session = start_session(training_config(Experiment::Flicker), 10, all_correct(), 10);
    session.finish_block(1);

    let header = std::fs::read_to_string(session.engine.context().recorder().path()).unwrap();
    let header = header.lines().next().unwrap();
    assert!(!header.contains("sample_occluded"));
    assert!(session.log().iter().all(|r| r.sample_occluded.is_none()));
}

#[test]
fn test_persisted_phase_must_match_configuration() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    seed_store(&data, PhaseId::Test2, 3, None);

    let store = ProgressStore::open(&data).unwrap();
    let recorder = TrialRecorder::create(data.join("run.tsv"), LogSchema::for_experiment(Experiment::TwoChange)).unwrap();
    let result = SessionContext::from_parts(
        training_config(Experiment::TwoChange),
        "ham",
        store,
        pool(10),
        recorder,
        today(),
        StdRng::seed_from_u64(1),
    );
    assert!(result.is_err());
}

#[test]
fn test_runs_started_in_the_same_second_get_separate_logs() {
    let temp = TempDir::new().unwrap();
    let stimuli = temp.path().join("stimuli").join("phase1_stimuli");
    std::fs::create_dir_all(&stimuli).unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(stimuli.join(format!("{}.gif", name)), b"GIF89a").unwrap();
    }
    let settings = SessionSettings {
        experiment: Experiment::Flicker,
        subject: "ham".to_string(),
        data_dir: temp.path().join("data"),
        stimuli_dir: temp.path().join("stimuli"),
        overrides: PhaseOverrides::default(),
        seed: Some(1),
    };

    let first = SessionContext::open(&settings, origin()).unwrap();
    let second = SessionContext::open(&settings, origin()).unwrap();
    let (first, second) = (first.recorder().path(), second.recorder().path());
    assert_ne!(first, second);
    assert!(first.exists());
    assert!(second.exists());
    assert_eq!(
        second.file_name().unwrap().to_str().unwrap(),
        "flicker_ham_2024-03-01_100000_2.tsv"
    );
}

// =============================================================================
// Runner
// =============================================================================

#[tokio::test]
async fn test_runner_quits_before_first_tick() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, all_correct(), 11);
    let end = run_until(&mut session.engine, 60, async {}).await.unwrap();
    assert_eq!(end, RunEnd::Quit);
}

#[tokio::test]
async fn test_runner_quits_during_penalty_and_keeps_logged_rows() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, correct_then_wrong(1, 1), 22);
    session.drive_until(|engine| matches!(engine.state(), TrialState::Penalizing { .. }));
    let state = session.engine.state();
    let trial = session.engine.current_trial().unwrap().trial_number;

    // The manual clock stands still, so the penalty never ends on its own
    let quit = tokio::time::sleep(Duration::from_millis(50));
    let end = run_until(&mut session.engine, 60, quit).await.unwrap();

    assert_eq!(end, RunEnd::Quit);
    assert_eq!(session.engine.state(), state);
    assert_eq!(session.engine.current_trial().unwrap().trial_number, trial);
    let rows = session.log();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].outcome, Outcome::Incorrect);
}

#[tokio::test]
async fn test_runner_quits_while_sample_is_shown() {
    let mut session = start_session(training_config(Experiment::TwoChange), 10, all_correct(), 23);
    session.drive_until(|engine| matches!(engine.state(), TrialState::Sampling { .. }));

    let quit = tokio::time::sleep(Duration::from_millis(50));
    let end = run_until(&mut session.engine, 60, quit).await.unwrap();

    assert_eq!(end, RunEnd::Quit);
    assert!(matches!(session.engine.state(), TrialState::Sampling { .. }));
    assert!(session.log().is_empty());
}

#[tokio::test]
async fn test_runner_runs_session_to_completion() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    let yesterday = chrono::Local::now().date_naive().pred_opt().unwrap();
    seed_store(&data, PhaseId::Training, 1, Some(yesterday));

    let clock = Rc::new(ScaledClock::new(10.0));
    let store = ProgressStore::open(&data).unwrap();
    let recorder = TrialRecorder::create(data.join("run.tsv"), LogSchema::for_experiment(Experiment::TwoChange)).unwrap();
    let ctx = SessionContext::from_parts(
        training_config(Experiment::TwoChange),
        "ham",
        store,
        pool(10),
        recorder,
        chrono::Local::now().date_naive(),
        StdRng::seed_from_u64(12),
    )
    .unwrap();
    let (rig, handle) = simulated_rig(Box::new(all_correct()), clock);
    let mut engine = TrialEngine::start(ctx, rig).unwrap();

    let end = tokio::time::timeout(
        Duration::from_secs(30),
        run_until(&mut engine, 500, std::future::pending::<()>()),
    )
    .await
    .expect("session should finish")
    .unwrap();

    assert_eq!(end, RunEnd::Finished(FinishReason::QualifyingSessionsReached));
    assert_eq!(handle.stats().rewards, 8);
    let progress = ProgressStore::open(&data).unwrap().load("Training").unwrap();
    assert_eq!(progress.completed_session_count, 2);
}
