//! Core ProgressStore implementation

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::error::{ProgressError, Result};
use crate::record::{DATE_FORMAT, SessionProgress};

/// Phase and qualifying session count
pub const NUM_SESSIONS_FILE: &str = "num_sessions.txt";

/// Date of the last completed training block
pub const LAST_COMPLETED_FILE: &str = "last_completed.txt";

/// Lock file serializing access across processes
pub const LOCK_FILE: &str = ".progress.lock";

/// Exclusive lock on the store directory, released on drop
struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ProgressError::io(&path, e))?;
        FileExt::lock_exclusive(&file).map_err(|source| ProgressError::Lock {
            path: path.clone(),
            source,
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = ?self.path, error = %e, "StoreLock: failed to release lock");
        }
    }
}

/// File-backed progress store
///
/// Every write goes through a temporary file that is synced and renamed over
/// the target, so a crash never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    /// Directory holding the progress files
    base_path: PathBuf,
}

impl ProgressStore {
    /// Open or create a progress store at the given directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| ProgressError::io(&base_path, e))?;
        debug!(?base_path, "Opened progress store");
        Ok(Self { base_path })
    }

    /// Directory the store lives in
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn num_sessions_path(&self) -> PathBuf {
        self.base_path.join(NUM_SESSIONS_FILE)
    }

    fn last_completed_path(&self) -> PathBuf {
        self.base_path.join(LAST_COMPLETED_FILE)
    }

    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(self.base_path.join(LOCK_FILE))
    }

    /// Load progress, falling back to `default_phase` with zero sessions when
    /// nothing has been persisted yet
    pub fn load(&self, default_phase: &str) -> Result<SessionProgress> {
        debug!(base_path = ?self.base_path, default_phase, "ProgressStore::load: called");
        let _lock = self.lock()?;

        let mut progress = match read_optional(&self.num_sessions_path())? {
            Some(content) => parse_num_sessions(&self.num_sessions_path(), &content)?,
            None => {
                debug!("ProgressStore::load: no session file, using defaults");
                SessionProgress::initial(default_phase)
            }
        };

        progress.last_completion_date = match read_optional(&self.last_completed_path())? {
            Some(content) => parse_date(&self.last_completed_path(), &content)?,
            None => None,
        };

        info!(
            phase = %progress.phase,
            count = progress.completed_session_count,
            last = ?progress.last_completion_date,
            "Loaded session progress"
        );
        Ok(progress)
    }

    /// Overwrite the phase and qualifying session count
    pub fn write_count(&self, phase: &str, count: u32) -> Result<()> {
        debug!(phase, count, "ProgressStore::write_count: called");
        let _lock = self.lock()?;
        write_atomic(&self.num_sessions_path(), &format!("{}\n{}", phase, count))
    }

    /// Overwrite the last-completed date marker; `None` clears it
    pub fn write_last_completed(&self, date: Option<NaiveDate>) -> Result<()> {
        debug!(?date, "ProgressStore::write_last_completed: called");
        let _lock = self.lock()?;
        write_atomic(&self.last_completed_path(), &date_content(date))
    }

    /// Overwrite the count and the date marker under a single lock
    ///
    /// Both files are staged and synced before either is renamed into place.
    pub fn write_progress(&self, phase: &str, count: u32, date: Option<NaiveDate>) -> Result<()> {
        debug!(phase, count, ?date, "ProgressStore::write_progress: called");
        let _lock = self.lock()?;
        let sessions = stage(&self.num_sessions_path(), &format!("{}\n{}", phase, count))?;
        let last = stage(&self.last_completed_path(), &date_content(date))?;
        commit(&sessions, &self.num_sessions_path())?;
        commit(&last, &self.last_completed_path())
    }
}

fn date_content(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProgressError::io(path, e)),
    }
}

fn parse_num_sessions(path: &Path, content: &str) -> Result<SessionProgress> {
    let mut lines = content.lines();
    let phase = lines
        .next()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ProgressError::malformed(path, "missing phase on line 1"))?;
    let count = lines
        .next()
        .ok_or_else(|| ProgressError::malformed(path, "missing session count on line 2"))?
        .trim()
        .parse::<u32>()
        .map_err(|e| ProgressError::malformed(path, format!("session count: {}", e)))?;
    Ok(SessionProgress {
        phase: phase.to_string(),
        completed_session_count: count,
        last_completion_date: None,
    })
}

fn parse_date(path: &Path, content: &str) -> Result<Option<NaiveDate>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map(Some)
        .map_err(|e| ProgressError::malformed(path, format!("date '{}': {}", trimmed, e)))
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = stage(path, content)?;
    commit(&tmp, path)
}

/// Write `content` to a synced temporary file next to `path`
fn stage(path: &Path, content: &str) -> Result<PathBuf> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| ProgressError::io(&tmp, e))?;
    file.write_all(content.as_bytes()).map_err(|e| ProgressError::io(&tmp, e))?;
    file.sync_all().map_err(|e| ProgressError::io(&tmp, e))?;
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|e| ProgressError::io(path, e))
}
