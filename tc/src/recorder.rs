//! TrialRecorder - append-only, tab-separated trial log
//!
//! One header row per run, then one row per trial attempt (timeouts
//! included). Every row is flushed before `record` returns because a run can
//! end in process termination at any moment.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use crate::engine::{Outcome, Trial};
use crate::error::{ControllerError, Result};
use crate::phase::{Experiment, PhaseId};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const NA: &str = "NA";

/// Highest `_N` suffix tried for a taken log name
const MAX_NAME_SUFFIX: u32 = 100;

/// Column layout of a trial log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSchema {
    /// Include the sample-occluded column
    pub with_occlusion: bool,
}

impl LogSchema {
    pub fn for_experiment(experiment: Experiment) -> Self {
        Self {
            with_occlusion: experiment == Experiment::TwoChange,
        }
    }

    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec!["subject", "date", "time", "phase", "block", "trial", "changed"];
        if self.with_occlusion {
            columns.push("sample_occluded");
        }
        columns.extend(["sample", "comparison", "dur_search", "dur_mask", "rt", "correct"]);
        columns
    }
}

/// One log row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub subject: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub phase: PhaseId,
    pub block: u32,
    pub trial: usize,
    pub changed: bool,
    pub sample_occluded: Option<bool>,
    pub sample: String,
    /// Same as `sample` on unchanged trials
    pub comparison: String,
    pub search_duration_ms: u64,
    pub mask_duration_ms: u64,
    pub reaction_time_ms: u64,
    pub outcome: Outcome,
}

impl TrialRecord {
    /// Snapshot a trial whose outcome has just been decided
    pub fn from_trial(subject: &str, at: NaiveDateTime, trial: &Trial, outcome: Outcome) -> Self {
        Self {
            subject: subject.to_string(),
            date: at.date(),
            time: at.time(),
            phase: trial.phase,
            block: trial.block,
            trial: trial.trial_number,
            changed: trial.is_changed,
            sample_occluded: trial.occlusion_flag,
            sample: trial.sample_ref.name.clone(),
            comparison: trial.test_ref().name.clone(),
            search_duration_ms: trial.search_duration_ms,
            mask_duration_ms: trial.mask_duration_ms,
            reaction_time_ms: trial.reaction_time_ms,
            outcome,
        }
    }

    fn fields(&self, schema: LogSchema) -> Vec<String> {
        let mut fields = vec![
            self.subject.clone(),
            self.date.format(DATE_FORMAT).to_string(),
            self.time.format(TIME_FORMAT).to_string(),
            self.phase.to_string(),
            self.block.to_string(),
            self.trial.to_string(),
            flag(self.changed).to_string(),
        ];
        if schema.with_occlusion {
            fields.push(self.sample_occluded.map(flag).unwrap_or(NA).to_string());
        }
        fields.extend([
            self.sample.clone(),
            self.comparison.clone(),
            self.search_duration_ms.to_string(),
            self.mask_duration_ms.to_string(),
            self.reaction_time_ms.to_string(),
            self.outcome.log_value().to_string(),
        ]);
        fields
    }

    fn parse(line: &str, schema: LogSchema) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split('\t').collect();
        let expected = schema.columns().len();
        if fields.len() != expected {
            return Err(format!("expected {} fields, found {}", expected, fields.len()));
        }
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();

        let subject = next().to_string();
        let date = NaiveDate::parse_from_str(next(), DATE_FORMAT).map_err(|e| format!("date: {}", e))?;
        let time = NaiveTime::parse_from_str(next(), TIME_FORMAT).map_err(|e| format!("time: {}", e))?;
        let phase = next().parse::<PhaseId>().map_err(|e| e.to_string())?;
        let block = next().parse().map_err(|e| format!("block: {}", e))?;
        let trial = next().parse().map_err(|e| format!("trial: {}", e))?;
        let changed = parse_flag(next())?;
        let sample_occluded = if schema.with_occlusion {
            match next() {
                NA => None,
                value => Some(parse_flag(value)?),
            }
        } else {
            None
        };
        let sample = next().to_string();
        let comparison = next().to_string();
        let search_duration_ms = next().parse().map_err(|e| format!("dur_search: {}", e))?;
        let mask_duration_ms = next().parse().map_err(|e| format!("dur_mask: {}", e))?;
        let reaction_time_ms = next().parse().map_err(|e| format!("rt: {}", e))?;
        let outcome_text = next();
        let outcome = Outcome::from_log_value(outcome_text).ok_or_else(|| format!("outcome '{}'", outcome_text))?;

        Ok(Self {
            subject,
            date,
            time,
            phase,
            block,
            trial,
            changed,
            sample_occluded,
            sample,
            comparison,
            search_duration_ms,
            mask_duration_ms,
            reaction_time_ms,
            outcome,
        })
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(format!("flag '{}'", other)),
    }
}

/// Log file name for a run started at `at`
pub fn log_file_name(experiment: Experiment, subject: &str, at: NaiveDateTime) -> String {
    format!(
        "{}_{}_{}.tsv",
        experiment.log_prefix(),
        subject,
        at.format("%Y-%m-%d_%H%M%S")
    )
}

/// Writer for one run's trial log
pub struct TrialRecorder {
    path: PathBuf,
    schema: LogSchema,
    writer: BufWriter<File>,
    rows: usize,
}

impl TrialRecorder {
    /// Create a new log at `path` and write its header
    pub fn create(path: impl AsRef<Path>, schema: LogSchema) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, ?schema, "TrialRecorder::create: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ControllerError::log(parent, e))?;
        }
        let file = open_new(&path).map_err(|e| ControllerError::log(&path, e))?;
        Self::start(path, file, schema)
    }

    /// Create a new log named `file_name` in `dir`, adding `_2`, `_3`, ...
    /// before the extension while the name is taken
    pub fn create_unique(dir: impl AsRef<Path>, file_name: &str, schema: LogSchema) -> Result<Self> {
        let dir = dir.as_ref();
        debug!(?dir, file_name, "TrialRecorder::create_unique: called");
        fs::create_dir_all(dir).map_err(|e| ControllerError::log(dir, e))?;

        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, extension)) => (stem, Some(extension)),
            None => (file_name, None),
        };
        for n in 1..=MAX_NAME_SUFFIX {
            let name = match (n, extension) {
                (1, _) => file_name.to_string(),
                (_, Some(extension)) => format!("{}_{}.{}", stem, n, extension),
                (_, None) => format!("{}_{}", stem, n),
            };
            let path = dir.join(name);
            match open_new(&path) {
                Ok(file) => return Self::start(path, file, schema),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(?path, "TrialRecorder::create_unique: name taken");
                }
                Err(e) => return Err(ControllerError::log(&path, e)),
            }
        }
        Err(ControllerError::log(
            dir.join(file_name),
            format!("no free log name after {} attempts", MAX_NAME_SUFFIX),
        ))
    }

    fn start(path: PathBuf, file: File, schema: LogSchema) -> Result<Self> {
        let mut recorder = Self {
            path,
            schema,
            writer: BufWriter::new(file),
            rows: 0,
        };
        let header = schema.columns().join("\t");
        recorder.write_line(&header)?;
        info!(path = ?recorder.path, "Trial log created");
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trial rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one trial row
    pub fn record(&mut self, record: &TrialRecord) -> Result<()> {
        debug!(
            block = record.block,
            trial = record.trial,
            outcome = ?record.outcome,
            "TrialRecorder::record: called"
        );
        let line = record.fields(self.schema).join("\t");
        self.write_line(&line)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| ControllerError::log(&self.path, e))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line).map_err(|e| ControllerError::log(&self.path, e))?;
        self.flush()
    }
}

fn open_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create_new(true).append(true).open(path)
}

/// Read a trial log back into records
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<TrialRecord>> {
    let path = path.as_ref();
    debug!(?path, "read_log: called");
    let content = fs::read_to_string(path).map_err(|e| ControllerError::log(path, e))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header = lines.next().ok_or_else(|| ControllerError::log(path, "empty log"))?;
    let schema = LogSchema {
        with_occlusion: header.split('\t').any(|c| c == "sample_occluded"),
    };
    if header.split('\t').collect::<Vec<_>>() != schema.columns() {
        return Err(ControllerError::log(path, format!("unrecognized header '{}'", header)));
    }

    lines
        .enumerate()
        .map(|(i, line)| {
            TrialRecord::parse(line, schema).map_err(|reason| ControllerError::log(path, format!("row {}: {}", i + 1, reason)))
        })
        .collect()
}
