//! Controller error taxonomy
//!
//! Only fatal conditions live here. Timeouts and wrong selections are trial
//! outcomes handled inside the engine.

use std::path::PathBuf;

use progressstore::ProgressError;
use thiserror::Error;

/// Fatal controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Impossible randomization constraints, missing stimuli, bad phase tables
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Progress files could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] ProgressError),

    /// Trial log could not be created, written or parsed
    #[error("Trial log error on {path}: {reason}")]
    Log { path: PathBuf, reason: String },
}

impl ControllerError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub(crate) fn log(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Log {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;
