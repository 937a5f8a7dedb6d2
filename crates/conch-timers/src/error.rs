use conch_core::script::ScriptError;
use thiserror::Error;

/// Errors that can occur within the timer subsystem.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer already running")]
    AlreadyRunning,

    #[error("timer not running")]
    NotRunning,

    /// Timer kinds are `0`/`"interval"` and `1`/`"timeout"`.
    #[error("invalid timer type: {0}")]
    InvalidKind(String),

    #[error("invalid timer duration: {0}")]
    InvalidDuration(i64),
}

impl From<TimerError> for ScriptError {
    fn from(e: TimerError) -> Self {
        ScriptError::new(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
