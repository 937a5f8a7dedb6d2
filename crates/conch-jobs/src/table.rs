//! `JobTable` — the registry of every job the shell knows about.
//!
//! One table is built at startup and shared as `Arc<JobTable>`. Jobs stay in
//! the table after they finish so scripts can still inspect them; only
//! [`JobTable::disown`] removes an entry.

use std::{
    collections::BTreeMap,
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use conch_core::{config::JobsConfig, script::Value};
use conch_hooks::EventBus;
use tracing::{debug, info, warn};

use crate::{
    capture::{pass_through, PassThrough},
    error::{JobError, Result},
    job::{Job, JobParts},
    sys::Signal,
    types::{JobInfo, JOB_ADD},
};

/// Concurrent registry of jobs keyed by id.
pub struct JobTable {
    bus: Arc<EventBus>,
    jobs: RwLock<Jobs>,
    /// Set while some job holds the terminal.
    foreground: Arc<AtomicBool>,
    stdout: PassThrough,
    stderr: PassThrough,
    capture_limit: usize,
}

#[derive(Default)]
struct Jobs {
    by_id: BTreeMap<u64, Arc<Job>>,
    latest_id: u64,
}

impl JobTable {
    /// Table with default settings whose jobs write through to the shell's
    /// own stdout and stderr.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_config(bus, &JobsConfig::default())
    }

    pub fn with_config(bus: Arc<EventBus>, config: &JobsConfig) -> Self {
        Self::with_output(bus, config, std::io::stdout(), std::io::stderr())
    }

    /// Table whose jobs pass their output through to `stdout`/`stderr`
    /// instead of the real streams.
    pub fn with_output<O, E>(bus: Arc<EventBus>, config: &JobsConfig, stdout: O, stderr: E) -> Self
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        Self {
            bus,
            jobs: RwLock::new(Jobs::default()),
            foreground: Arc::new(AtomicBool::new(false)),
            stdout: pass_through(stdout),
            stderr: pass_through(stderr),
            capture_limit: config.capture_limit,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Register a new job and publish `job.add`. The job is not started.
    ///
    /// `args[0]` is the process name; `path` the executable to run.
    pub fn add(&self, cmd: &str, args: Vec<String>, path: &str) -> Arc<Job> {
        let job = {
            let mut jobs = self.jobs.write().expect("job table poisoned");
            jobs.latest_id += 1;
            let job = Arc::new(Job::new(JobParts {
                id: jobs.latest_id,
                cmd: cmd.to_string(),
                args,
                path: path.to_string(),
                bus: Arc::clone(&self.bus),
                foreground: Arc::clone(&self.foreground),
                cmdout: Arc::clone(&self.stdout),
                cmderr: Arc::clone(&self.stderr),
                capture_limit: self.capture_limit,
            }));
            jobs.by_id.insert(job.id(), Arc::clone(&job));
            job
        };

        info!(job_id = job.id(), cmd, "job added");
        // Published outside the lock so listeners may query the table.
        self.bus.emit(JOB_ADD, &[Value::userdata(job.handle())]);
        job
    }

    /// Remove job `id` from the table. A running job keeps running.
    pub fn disown(&self, id: u64) -> Result<()> {
        let removed = self
            .jobs
            .write()
            .expect("job table poisoned")
            .by_id
            .remove(&id);
        match removed {
            Some(_) => {
                debug!(job_id = id, "job disowned");
                Ok(())
            }
            None => Err(JobError::NotFound(id)),
        }
    }

    /// Hang up every job whose process is still alive and wait for each to
    /// exit. That includes jobs already marked stopped whose process ignored
    /// the termination request.
    ///
    /// Best effort: a delivery failure is logged and the job skipped. A job
    /// that ignores the hangup blocks this call until it exits.
    pub fn stop_all(&self) {
        // Snapshot first: waiting must not happen under the table lock.
        let running: Vec<Arc<Job>> = self
            .jobs
            .read()
            .expect("job table poisoned")
            .by_id
            .values()
            .filter(|job| job.live_pid().is_some())
            .cloned()
            .collect();

        if running.is_empty() {
            return;
        }
        info!(count = running.len(), "hanging up running jobs");

        for job in running {
            match job.signal_process(Signal::Hangup) {
                Ok(()) => job.wait(),
                // Finished between the snapshot and the signal.
                Err(JobError::NotRunning) => {}
                Err(e) => warn!(job_id = job.id(), "failed to hang up job: {e}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: u64) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .expect("job table poisoned")
            .by_id
            .get(&id)
            .cloned()
    }

    /// The most recently added job, unless it has been disowned.
    pub fn get_latest(&self) -> Option<Arc<Job>> {
        let jobs = self.jobs.read().expect("job table poisoned");
        jobs.by_id.get(&jobs.latest_id).cloned()
    }

    /// Every job in the table, in id order.
    pub fn all(&self) -> Vec<Arc<Job>> {
        self.jobs
            .read()
            .expect("job table poisoned")
            .by_id
            .values()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<JobInfo> {
        self.all().iter().map(|job| job.info()).collect()
    }

    /// Whether a job currently holds the terminal.
    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for JobTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let jobs = self.jobs.read().expect("job table poisoned");
        f.debug_struct("JobTable")
            .field("jobs", &jobs.by_id.len())
            .field("latest_id", &jobs.latest_id)
            .field("foreground", &self.is_foreground())
            .finish()
    }
}
