//! Errors from progress persistence

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing progress files
///
/// None of these are recoverable: a controller that cannot tell how many
/// sessions it has credited must not keep running.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed progress file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProgressError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for progress operations
pub type Result<T> = std::result::Result<T, ProgressError>;
