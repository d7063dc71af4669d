//! ProgressStore - persisted session progress for multi-run training schedules
//!
//! Keeps the two pieces of state that must survive process restarts and
//! several runs on the same calendar day: the current phase with its
//! qualifying session count, and the date the last block was completed.
//!
//! # Layout
//!
//! ```text
//! data/
//! ├── num_sessions.txt     # line 1: phase, line 2: qualifying session count
//! ├── last_completed.txt   # YYYY-MM-DD, or empty
//! └── .progress.lock       # exclusive lock held while reading or writing
//! ```
//!
//! # Example
//!
//! ```ignore
//! use progressstore::ProgressStore;
//!
//! let store = ProgressStore::open("data")?;
//! let progress = store.load("PreTraining")?;
//! store.write_count(&progress.phase, progress.completed_session_count + 1)?;
//! ```

mod error;
mod record;
mod store;

pub use error::{ProgressError, Result};
pub use record::{DATE_FORMAT, SessionProgress};
pub use store::{LAST_COMPLETED_FILE, LOCK_FILE, NUM_SESSIONS_FILE, ProgressStore};
