//! Error types for the conch-jobs crate.

use conch_core::script::ScriptError;
use thiserror::Error;

/// All errors that can originate from job control.
#[derive(Debug, Error)]
pub enum JobError {
    /// The operation needs a running process.
    #[error("job not running")]
    NotRunning,

    /// No job with this id is in the table.
    #[error("job doesn't exist")]
    NotFound(u64),

    /// Another job currently holds the terminal.
    #[error("another job is already in the foreground")]
    ForegroundBusy,

    /// The process could not be launched.
    #[error("failed to launch {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Signal delivery or terminal control failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<JobError> for ScriptError {
    fn from(e: JobError) -> Self {
        ScriptError::new(e.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, JobError>;
