//! A single OS process under shell job control.

use std::{
    fmt,
    process::{Child, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread,
};

use chrono::{DateTime, Utc};
use conch_core::script::Value;
use conch_hooks::EventBus;
use tracing::{debug, info, warn};

use crate::{
    capture::{spawn_tee, CaptureBuffer, PassThrough},
    error::{JobError, Result},
    handle::JobHandle,
    sys::{self, Signal},
    types::{JobInfo, JOB_DONE, JOB_START},
};

/// One shell job.
///
/// A job can be started again after it finishes; every start launches a
/// fresh process and clears the capture buffers.
pub struct Job {
    id: u64,
    cmd: String,
    bus: Arc<EventBus>,
    /// Table-wide "a job owns the terminal" flag.
    foreground: Arc<AtomicBool>,
    state: Mutex<JobState>,
    /// Signalled when the current run's process exits and again when the
    /// run has fully settled.
    settled: Condvar,
    stdout: CaptureBuffer,
    stderr: CaptureBuffer,
    cmdout: PassThrough,
    cmderr: PassThrough,
}

struct JobState {
    args: Vec<String>,
    path: String,
    pid: u32,
    exit_code: i32,
    running: bool,
    /// Bumped on every launch so a stale waiter cannot touch a newer run.
    generation: u64,
    /// The current run's process has exited and its exit code is recorded.
    /// True before the first launch.
    exited: bool,
    /// `exited`, and `job.done` has gone out as well.
    settled: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

pub(crate) struct JobParts {
    pub id: u64,
    pub cmd: String,
    pub args: Vec<String>,
    pub path: String,
    pub bus: Arc<EventBus>,
    pub foreground: Arc<AtomicBool>,
    pub cmdout: PassThrough,
    pub cmderr: PassThrough,
    pub capture_limit: usize,
}

impl Job {
    pub(crate) fn new(parts: JobParts) -> Self {
        Self {
            id: parts.id,
            cmd: parts.cmd,
            bus: parts.bus,
            foreground: parts.foreground,
            state: Mutex::new(JobState {
                args: parts.args,
                path: parts.path,
                pid: 0,
                exit_code: 0,
                running: false,
                generation: 0,
                exited: true,
                settled: true,
                started_at: None,
                finished_at: None,
            }),
            settled: Condvar::new(),
            stdout: CaptureBuffer::new(parts.capture_limit),
            stderr: CaptureBuffer::new(parts.capture_limit),
            cmdout: parts.cmdout,
            cmderr: parts.cmderr,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn pid(&self) -> u32 {
        self.lock().pid
    }

    pub fn exit_code(&self) -> i32 {
        self.lock().exit_code
    }

    /// Captured stdout of the current (or last) run.
    pub fn stdout(&self) -> String {
        self.stdout.text()
    }

    /// Captured stderr of the current (or last) run.
    pub fn stderr(&self) -> String {
        self.stderr.text()
    }

    pub fn info(&self) -> JobInfo {
        let state = self.lock();
        JobInfo {
            id: self.id,
            cmd: self.cmd.clone(),
            args: state.args.clone(),
            path: state.path.clone(),
            pid: state.pid,
            exit_code: state.exit_code,
            running: state.running,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// The script-facing handle for this job.
    pub fn handle(self: &Arc<Self>) -> JobHandle {
        JobHandle::new(Arc::clone(self))
    }

    /// Launch the job's process. No-op if it is already running.
    ///
    /// On success the job is running and `job.start` has been published; a
    /// waiter thread records the exit code and finishes the job when the
    /// process exits. On a launch error `job.start` is still published, the
    /// error is stored as an exit code (127 not found, 126 permission denied,
    /// 1 otherwise) and the job is finished before the error is returned.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.lock();
        if state.running {
            return Ok(());
        }

        let mut command = sys::build_command(&state.path, &state.args);
        sys::background_attr(&mut command);
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        self.stdout.reset();
        self.stderr.reset();

        state.generation += 1;
        state.running = true;
        state.exited = false;
        state.settled = false;
        state.started_at = Some(Utc::now());
        state.finished_at = None;
        let generation = state.generation;

        let spawned = command.spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                state.pid = 0;
                state.exited = true;
                state.exit_code = sys::launch_error_code(&source);
                let path = state.path.clone();
                drop(state);
                warn!(job_id = self.id, %path, "job launch failed: {source}");
                self.bus.emit(JOB_START, &[self.value()]);
                self.finish();
                self.settle(generation);
                return Err(JobError::Spawn { path, source });
            }
        };
        state.pid = child.id();
        let pid = state.pid;
        drop(state);

        let mut tees = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            tees.push(spawn_tee(
                format!("job-{}-stdout", self.id),
                out,
                Arc::clone(&self.cmdout),
                self.stdout.clone(),
            ));
        }
        if let Some(err) = child.stderr.take() {
            tees.push(spawn_tee(
                format!("job-{}-stderr", self.id),
                err,
                Arc::clone(&self.cmderr),
                self.stderr.clone(),
            ));
        }
        let tees: Vec<_> = tees
            .into_iter()
            .filter_map(|tee| match tee {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(job_id = self.id, "output reader spawn failed: {e}");
                    None
                }
            })
            .collect();

        info!(job_id = self.id, pid, cmd = %self.cmd, "job started");
        self.bus.emit(JOB_START, &[self.value()]);

        // Started after job.start so job.done can never overtake it.
        let job = Arc::clone(self);
        thread::spawn(move || {
            let status = wait_child(&mut child);
            for tee in tees {
                let _ = tee.join();
            }
            job.record_exit(generation, status);
        });

        Ok(())
    }

    /// Start the job the way the shell does: a launch failure only shows up
    /// in `exit_code`, never as an error.
    pub fn launch(self: &Arc<Self>) {
        if let Err(err) = self.start() {
            debug!(job_id = self.id, exit_code = self.exit_code(), "launch failure recorded: {err}");
        }
    }

    /// Ask the process to terminate. The caller finishes the job afterwards.
    pub fn stop(&self) -> Result<()> {
        let pid = {
            let state = self.lock();
            if !state.running || state.pid == 0 {
                return Ok(());
            }
            state.pid
        };
        debug!(job_id = self.id, pid, "sending termination request");
        sys::send_signal(pid, Signal::Terminate)?;
        Ok(())
    }

    /// Mark the job as no longer running and publish `job.done`.
    ///
    /// Only the first call per run publishes; later calls are no-ops.
    pub fn finish(self: &Arc<Self>) {
        let was_running = mark_finished(&mut self.lock());
        if was_running {
            self.publish_done();
        }
    }

    /// Block until the current run's process has exited and the job has
    /// finished. Returns immediately for a job that was never started.
    ///
    /// Off the engine thread this also waits for `job.done` delivery. On the
    /// engine thread, script listeners of `job.done` cannot run until this
    /// returns, so it only waits for the exit.
    pub fn wait(&self) {
        let until_settled = !self.bus.engine().on_engine_thread();
        let mut state = self.lock();
        while !(state.exited && (state.settled || !until_settled)) {
            state = self.settled.wait(state).expect("job state poisoned");
        }
    }

    /// Resume the process if it was suspended. Harmless when it was not.
    pub fn background(&self) -> Result<()> {
        let pid = self.running_pid()?;
        sys::send_signal(pid, Signal::Continue)?;
        debug!(job_id = self.id, pid, "job continued in background");
        Ok(())
    }

    /// Resume the job, give it the terminal, and block until it exits.
    ///
    /// Only one job may hold the terminal at a time; a concurrent request
    /// fails with [`JobError::ForegroundBusy`].
    pub fn foreground(&self) -> Result<()> {
        let pid = self.running_pid()?;
        if self
            .foreground
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JobError::ForegroundBusy);
        }
        let _flag = ForegroundFlag(&self.foreground);

        sys::send_signal(pid, Signal::Continue)?;
        let terminal = sys::give_terminal(pid)?;
        info!(job_id = self.id, pid, tty = terminal.is_some(), "job in foreground");

        self.wait();
        drop(terminal);
        Ok(())
    }

    // --- private helpers ---------------------------------------------------

    /// Signal the current run's process while it is alive, including after
    /// a `stop` that it ignored.
    pub(crate) fn signal_process(&self, signal: Signal) -> Result<()> {
        let pid = self.live_pid().ok_or(JobError::NotRunning)?;
        sys::send_signal(pid, signal)?;
        Ok(())
    }

    /// Pid of a process that has been launched and not yet reaped.
    pub(crate) fn live_pid(&self) -> Option<u32> {
        let state = self.lock();
        (!state.exited && state.pid != 0).then_some(state.pid)
    }

    fn running_pid(&self) -> Result<u32> {
        let state = self.lock();
        if !state.running || state.pid == 0 {
            return Err(JobError::NotRunning);
        }
        Ok(state.pid)
    }

    fn record_exit(self: &Arc<Self>, generation: u64, status: std::io::Result<i32>) {
        let was_running = {
            let mut state = self.lock();
            if state.generation != generation {
                // Restarted meanwhile; this exit belongs to an old process.
                return;
            }
            state.exit_code = match status {
                Ok(code) => code,
                Err(e) => {
                    warn!(job_id = self.id, "waiting for job failed: {e}");
                    -1
                }
            };
            debug!(job_id = self.id, exit_code = state.exit_code, "job process exited");
            state.exited = true;
            let was_running = mark_finished(&mut state);
            // Wakes engine-thread waiters before job.done needs that thread.
            self.settled.notify_all();
            was_running
        };
        if was_running {
            self.publish_done();
        }
        self.settle(generation);
    }

    fn publish_done(self: &Arc<Self>) {
        info!(job_id = self.id, "job done");
        self.bus.emit(JOB_DONE, &[self.value()]);
    }

    fn settle(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            state.settled = true;
            self.settled.notify_all();
        }
    }

    fn value(self: &Arc<Self>) -> Value {
        Value::userdata(self.handle())
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().expect("job state poisoned")
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("cmd", &self.cmd)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clear `running` for the current run. True if it was set.
fn mark_finished(state: &mut JobState) -> bool {
    let was_running = std::mem::replace(&mut state.running, false);
    if was_running && state.finished_at.is_none() {
        state.finished_at = Some(Utc::now());
    }
    was_running
}

/// Clears the table's foreground flag when dropped.
struct ForegroundFlag<'a>(&'a AtomicBool);

impl Drop for ForegroundFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn wait_child(child: &mut Child) -> std::io::Result<i32> {
    child.wait().map(sys::exit_code)
}
