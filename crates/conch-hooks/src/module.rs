//! `bait` — the script-facing side of the event bus.
//!
//! Scripts catch hooks (listen to events) and throw them (emit events).
//! Both the short names and the descriptive aliases are exported:
//!
//! | Function                         | Alias           |
//! |----------------------------------|-----------------|
//! | `catch(name, cb)`                | `subscribe`     |
//! | `catchOnce(name, cb)`            | `subscribeOnce` |
//! | `release(name, cb)`              | `unsubscribe`   |
//! | `throw(name, ...)`               | `publish`       |
//! | `hooks(name) -> {cb, ...}`       | `listListeners` |

use std::sync::Arc;

use conch_core::script::args::{check_args, function_arg, string_arg};
use conch_core::script::{ScriptError, ScriptFunction, ScriptModule, Value};

use crate::bus::EventBus;

const EXPORTS: &[&str] = &[
    "catch",
    "catchOnce",
    "release",
    "throw",
    "hooks",
    "subscribe",
    "subscribeOnce",
    "unsubscribe",
    "publish",
    "listListeners",
];

pub struct BaitModule {
    bus: Arc<EventBus>,
}

impl BaitModule {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

/// `(name, callback)` argument pair shared by catch/catchOnce/release.
fn name_and_callback(args: &[Value]) -> Result<(&str, &ScriptFunction), ScriptError> {
    check_args(args, 2)?;
    Ok((string_arg(args, 0)?, function_arg(args, 1)?))
}

impl ScriptModule for BaitModule {
    fn name(&self) -> &'static str {
        "bait"
    }

    fn exports(&self) -> &'static [&'static str] {
        EXPORTS
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match function {
            // The callback doubles as the handle: pass it back to `release`.
            "catch" | "subscribe" => {
                let (name, cb) = name_and_callback(args)?;
                self.bus.on_script(name, cb.clone());
                Ok(Value::Function(cb.clone()))
            }
            "catchOnce" | "subscribeOnce" => {
                let (name, cb) = name_and_callback(args)?;
                self.bus.once_script(name, cb.clone());
                Ok(Value::Function(cb.clone()))
            }
            "release" | "unsubscribe" => {
                let (name, cb) = name_and_callback(args)?;
                self.bus.off_script(name, cb);
                Ok(Value::Nil)
            }
            "throw" | "publish" => {
                check_args(args, 1)?;
                let name = string_arg(args, 0)?;
                self.bus.emit(name, &args[1..]);
                Ok(Value::Nil)
            }
            "hooks" | "listListeners" => {
                check_args(args, 1)?;
                let name = string_arg(args, 0)?;
                let funcs = self.bus.script_listeners(name)?;
                Ok(Value::list(funcs))
            }
            other => Err(ScriptError::new(format!("bait has no function '{other}'"))),
        }
    }
}
