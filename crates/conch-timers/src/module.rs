//! `timers` — the script-facing side of the timer scheduler.
//!
//! `create(kind, ms, fn)` registers a timer without starting it; `kind` is
//! `0`/`"interval"` or `1`/`"timeout"` and `ms` must not be negative. `get(id)` returns the handle or nil,
//! `running()` the number of running timers.

use std::sync::Arc;
use std::time::Duration;

use conch_core::script::args::{check_args, function_arg, int_arg};
use conch_core::script::{ScriptError, ScriptModule, Value};

use crate::error::TimerError;
use crate::scheduler::TimerScheduler;
use crate::types::TimerKind;

const EXPORTS: &[&str] = &["create", "get", "running"];

pub struct TimersModule {
    scheduler: Arc<TimerScheduler>,
}

impl TimersModule {
    pub fn new(scheduler: Arc<TimerScheduler>) -> Self {
        Self { scheduler }
    }
}

fn kind_arg(args: &[Value], idx: usize) -> Result<TimerKind, ScriptError> {
    match &args[idx] {
        Value::Str(s) => Ok(s.parse::<TimerKind>()?),
        other => match other.as_int() {
            Some(code) => Ok(TimerKind::from_code(code)?),
            None => Err(TimerError::InvalidKind(other.type_name().to_string()).into()),
        },
    }
}

impl ScriptModule for TimersModule {
    fn name(&self) -> &'static str {
        "timers"
    }

    fn exports(&self) -> &'static [&'static str] {
        EXPORTS
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match function {
            "create" => {
                check_args(args, 3)?;
                let kind = kind_arg(args, 0)?;
                let ms = int_arg(args, 1)?;
                let ms = u64::try_from(ms).map_err(|_| TimerError::InvalidDuration(ms))?;
                let callback = function_arg(args, 2)?;
                let duration = Duration::from_millis(ms);
                let timer = self.scheduler.create(kind, duration, callback.clone());
                Ok(Value::userdata(timer.handle()))
            }
            "get" => {
                check_args(args, 1)?;
                let timer = u64::try_from(int_arg(args, 0)?)
                    .ok()
                    .and_then(|id| self.scheduler.get(id));
                Ok(timer.map_or(Value::Nil, |t| Value::userdata(t.handle())))
            }
            "running" => Ok(Value::from(self.scheduler.running() as u64)),
            other => Err(ScriptError::new(format!("timers has no function '{other}'"))),
        }
    }
}
