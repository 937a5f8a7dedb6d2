use std::any::Any;
use std::fmt;
use std::sync::Arc;

use conch_core::script::{ScriptError, UserData, Value};

use crate::job::Job;

/// Opaque script handle over a [`Job`].
///
/// Fields: `cmd`, `running`, `id`, `pid`, `exitCode`, `stdout`, `stderr`.
/// Methods: `start`, `stop`, `foreground`, `background`.
#[derive(Clone)]
pub struct JobHandle {
    job: Arc<Job>,
}

impl JobHandle {
    pub(crate) fn new(job: Arc<Job>) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobHandle").field(&self.job.id()).finish()
    }
}

impl UserData for JobHandle {
    fn type_name(&self) -> &'static str {
        "job"
    }

    fn get(&self, field: &str) -> Option<Value> {
        let value = match field {
            "cmd" => Value::from(self.job.cmd()),
            "running" => Value::from(self.job.is_running()),
            "id" => Value::from(self.job.id()),
            "pid" => Value::from(self.job.pid()),
            "exitCode" => Value::from(self.job.exit_code()),
            "stdout" => Value::from(self.job.stdout()),
            "stderr" => Value::from(self.job.stderr()),
            _ => return None,
        };
        Some(value)
    }

    fn call_method(&self, method: &str, _args: &[Value]) -> Result<Value, ScriptError> {
        match method {
            // A launch failure lands in `exitCode`; start itself never fails.
            "start" => self.job.launch(),
            "stop" => {
                if self.job.is_running() {
                    self.job.stop()?;
                    self.job.finish();
                }
            }
            "foreground" => self.job.foreground()?,
            "background" => self.job.background()?,
            other => {
                return Err(ScriptError::new(format!("job has no method '{other}'")));
            }
        }
        Ok(Value::Nil)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
