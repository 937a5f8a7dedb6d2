//! Shared data types for conch-jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published with the job handle right after a job enters the table.
pub const JOB_ADD: &str = "job.add";
/// Published with the job handle once its process has been launched.
pub const JOB_START: &str = "job.start";
/// Published with the job handle when a run ends, exactly once per run.
pub const JOB_DONE: &str = "job.done";

/// Point-in-time snapshot of a job, as returned by `Job::info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Sequential id, unique for the lifetime of the table.
    pub id: u64,

    /// The command line as the user typed it.
    pub cmd: String,

    /// Argument vector; `args[0]` is the process name.
    pub args: Vec<String>,

    /// Resolved executable path.
    pub path: String,

    /// OS process id of the most recent launch (0 if never launched).
    pub pid: u32,

    /// Exit code of the most recent run.
    pub exit_code: i32,

    pub running: bool,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}
