//! The boundary between the shell core and the embedded scripting engine.

pub mod args;
mod closure;
mod engine;
mod value;

pub use closure::ClosureEngine;
pub use engine::{EngineHandle, ScriptEngine};
pub use value::{ScriptError, ScriptFunction, UserData, Value};

/// A native library exposed to scripts as a table of functions.
pub trait ScriptModule: Send + Sync {
    /// Global name scripts use to reach the module (e.g. `"jobs"`).
    fn name(&self) -> &'static str;

    /// Function names the module answers to.
    fn exports(&self) -> &'static [&'static str];

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ScriptError>;
}
