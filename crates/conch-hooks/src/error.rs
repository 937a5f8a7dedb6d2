use conch_core::script::ScriptError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    /// Introspection found no script listeners for the event.
    #[error("no hooks for event {event}")]
    NoHooks { event: String },
}

impl From<HookError> for ScriptError {
    fn from(e: HookError) -> Self {
        ScriptError::new(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HookError>;
