//! `jobs` — the script-facing side of the job table.
//!
//! | Function                  | Returns                         |
//! |---------------------------|---------------------------------|
//! | `add(cmd, args, path)`    | job handle (not started)        |
//! | `addJob(cmd, args, path)` | alias of `add`                  |
//! | `all()`                   | table `{ [id] = job, ... }`     |
//! | `last()`                  | latest job handle or nil        |
//! | `get(id)`                 | job handle or nil               |
//! | `disown(id)`              | nil, or "job doesn't exist"     |

use std::sync::Arc;

use conch_core::script::args::{check_args, int_arg, string_arg, table_arg};
use conch_core::script::{ScriptError, ScriptModule, Value};

use crate::job::Job;
use crate::table::JobTable;

const EXPORTS: &[&str] = &["add", "addJob", "all", "last", "get", "disown"];

pub struct JobsModule {
    table: Arc<JobTable>,
}

impl JobsModule {
    pub fn new(table: Arc<JobTable>) -> Self {
        Self { table }
    }
}

fn handle_value(job: Option<Arc<Job>>) -> Value {
    job.map_or(Value::Nil, |job| Value::userdata(job.handle()))
}

/// Job ids are positive; anything else cannot name a job.
fn id_arg(args: &[Value], idx: usize) -> Result<Option<u64>, ScriptError> {
    Ok(u64::try_from(int_arg(args, idx)?).ok())
}

impl ScriptModule for JobsModule {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn exports(&self) -> &'static [&'static str] {
        EXPORTS
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match function {
            "add" | "addJob" => {
                check_args(args, 3)?;
                let cmd = string_arg(args, 0)?;
                // Non-string entries are skipped, like the shell's own argv builder.
                let argv = table_arg(args, 1)?
                    .iter()
                    .filter_map(|(_, v)| v.as_str().map(str::to_string))
                    .collect();
                let path = string_arg(args, 2)?;
                Ok(handle_value(Some(self.table.add(cmd, argv, path))))
            }
            "all" => Ok(Value::Table(
                self.table
                    .all()
                    .into_iter()
                    .map(|job| (Value::from(job.id()), Value::userdata(job.handle())))
                    .collect(),
            )),
            "last" => Ok(handle_value(self.table.get_latest())),
            "get" => {
                check_args(args, 1)?;
                let job = id_arg(args, 0)?.and_then(|id| self.table.get(id));
                Ok(handle_value(job))
            }
            "disown" => {
                check_args(args, 1)?;
                let id = int_arg(args, 0)?;
                let id = u64::try_from(id).map_err(|_| crate::JobError::NotFound(0))?;
                self.table.disown(id)?;
                Ok(Value::Nil)
            }
            other => Err(ScriptError::new(format!("jobs has no function '{other}'"))),
        }
    }
}
