use thiserror::Error;

use crate::script::ScriptError;

#[derive(Debug, Error)]
pub enum ConchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the engine call queue itself, as opposed to errors raised by scripts.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine worker has shut down; no further calls are accepted.
    #[error("script engine is closed")]
    Closed,

    /// The worker dropped the reply channel, usually because the call panicked.
    #[error("script engine dropped the call")]
    Dropped,

    /// The engine worker thread could not be spawned.
    #[error("failed to start engine worker: {0}")]
    Spawn(String),
}

impl ConchError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ConchError::Config(_) => "CONFIG_ERROR",
            ConchError::Script(_) => "SCRIPT_ERROR",
            ConchError::Engine(_) => "ENGINE_ERROR",
            ConchError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<EngineError> for ScriptError {
    fn from(e: EngineError) -> Self {
        ScriptError::new(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConchError>;
