//! `conch-core` — configuration, errors, and the scripting-engine boundary
//! shared by every conch subsystem.
//!
//! The engine itself is external. This crate only defines what the shell
//! needs from it: [`script::ScriptEngine`] to call script functions, the
//! [`script::Value`] model passed across the boundary, [`script::UserData`]
//! for opaque handles, and [`script::EngineHandle`], the single call queue
//! every background thread goes through.

pub mod config;
pub mod error;
pub mod script;

pub use config::ConchConfig;
pub use error::{ConchError, EngineError, Result};
