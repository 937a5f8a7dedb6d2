//! `conch-jobs` — shell job control.
//!
//! A [`JobTable`] tracks every OS process the shell launches as a job.
//! Each [`Job`] runs detached from the shell's signal group, tees its output
//! to the shell's real streams and to capture buffers, and publishes its
//! lifecycle on the event bus:
//!
//! | Event       | When                                     |
//! |-------------|------------------------------------------|
//! | `job.add`   | the job entered the table                |
//! | `job.start` | a process was launched (or failed to)    |
//! | `job.done`  | the run ended, exactly once per run      |
//!
//! Every event carries the job's script handle ([`JobHandle`]).

pub mod capture;
pub mod error;
pub mod handle;
pub mod job;
pub mod module;
pub mod sys;
pub mod table;
pub mod types;

pub use error::{JobError, Result};
pub use handle::JobHandle;
pub use job::Job;
pub use module::JobsModule;
pub use table::JobTable;
pub use types::{JobInfo, JOB_ADD, JOB_DONE, JOB_START};
