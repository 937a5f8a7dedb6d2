use std::any::Any;
use std::fmt;
use std::sync::Arc;

use conch_core::script::{ScriptError, UserData, Value};

use crate::timer::Timer;

/// Script handle over a [`Timer`]: fields `id`, `type`, `duration` (ms) and
/// `running`; methods `start` and `stop`.
#[derive(Clone)]
pub struct TimerHandle {
    timer: Arc<Timer>,
}

impl TimerHandle {
    pub(crate) fn new(timer: Arc<Timer>) -> Self {
        Self { timer }
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimerHandle").field(&self.timer.id()).finish()
    }
}

impl UserData for TimerHandle {
    fn type_name(&self) -> &'static str {
        "timer"
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::from(self.timer.id())),
            "type" => Some(Value::Int(self.timer.kind().code())),
            "duration" => Some(Value::from(self.timer.duration().as_millis() as u64)),
            "running" => Some(Value::from(self.timer.is_running())),
            _ => None,
        }
    }

    fn call_method(&self, method: &str, _args: &[Value]) -> Result<Value, ScriptError> {
        match method {
            "start" => self.timer.start()?,
            "stop" => self.timer.stop()?,
            other => return Err(ScriptError::new(format!("timer has no method '{other}'"))),
        }
        Ok(Value::Nil)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
