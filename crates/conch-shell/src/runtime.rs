use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use conch_core::config::ConchConfig;
use conch_core::script::{ClosureEngine, EngineHandle, Value};
use conch_hooks::{BaitModule, EventBus};
use conch_jobs::{Job, JobError, JobHandle, JobInfo, JobTable, JobsModule, JOB_ADD, JOB_DONE, JOB_START};
use conch_timers::{TimerInfo, TimerScheduler, TimersModule};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

/// Every subsystem of one shell instance, built once at startup.
pub struct ShellRuntime {
    pub config: ConchConfig,
    pub engine: ClosureEngine,
    pub handle: EngineHandle,
    pub bus: Arc<EventBus>,
    pub jobs: Arc<JobTable>,
    pub timers: Arc<TimerScheduler>,
}

/// Final state printed by `--report`.
#[derive(Debug, Serialize)]
pub struct Report {
    pub jobs: Vec<JobInfo>,
    pub timers: Vec<TimerInfo>,
}

impl ShellRuntime {
    /// Runtime whose jobs write through to the process's own streams.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ConchConfig) -> conch_core::Result<Self> {
        Self::with_output(config, Handle::current(), std::io::stdout(), std::io::stderr())
    }

    pub fn with_output<O, E>(
        config: ConchConfig,
        runtime: Handle,
        stdout: O,
        stderr: E,
    ) -> conch_core::Result<Self>
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let engine = ClosureEngine::new();
        let handle = EngineHandle::spawn(engine.clone())?;
        let bus = Arc::new(EventBus::new(handle.clone()));
        let jobs = Arc::new(JobTable::with_output(
            Arc::clone(&bus),
            &config.jobs,
            stdout,
            stderr,
        ));
        let timers = Arc::new(TimerScheduler::new(handle.clone(), runtime));

        handle.load_module(Arc::new(BaitModule::new(Arc::clone(&bus))))?;
        handle.load_module(Arc::new(JobsModule::new(Arc::clone(&jobs))))?;
        handle.load_module(Arc::new(TimersModule::new(Arc::clone(&timers))))?;

        let runtime = Self {
            config,
            engine,
            handle,
            bus,
            jobs,
            timers,
        };
        runtime.install_hooks();
        info!("shell runtime ready");
        Ok(runtime)
    }

    /// Add a job for `line` and launch it. A command that cannot be found
    /// still becomes a job; it finishes at once with exit code 127.
    pub fn launch(&self, line: &str) -> Option<Arc<Job>> {
        let args = parse_command_line(line);
        let program = args.first()?;
        let path = which::which(program)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| program.clone());

        let job = self.jobs.add(line, args, &path);
        job.launch();
        Some(job)
    }

    /// Launch every command line and block until all of them have exited.
    /// With `foreground`, the last job gets the terminal while it runs.
    pub fn run_jobs(&self, lines: &[String], foreground: bool) {
        let launched: Vec<Arc<Job>> = lines.iter().filter_map(|l| self.launch(l)).collect();
        let Some((last, rest)) = launched.split_last() else {
            return;
        };

        if foreground {
            match last.foreground() {
                // Already exited; nothing to hand the terminal to.
                Ok(()) | Err(JobError::NotRunning) => {}
                Err(e) => warn!(job_id = last.id(), "cannot foreground job: {e}"),
            }
        } else {
            last.wait();
        }
        for job in rest {
            job.wait();
        }
    }

    /// Stop timers, hang up jobs when configured to, and stop the engine.
    pub async fn shutdown(self: &Arc<Self>) {
        let timers = Arc::clone(&self.timers);
        // Timer::stop waits on the engine thread; keep that off the async workers.
        if let Err(e) = tokio::task::spawn_blocking(move || timers.stop_all()).await {
            error!("stopping timers failed: {e}");
        }
        let grace = Duration::from_millis(self.config.timers.shutdown_grace_ms);
        if tokio::time::timeout(grace, self.timers.wait_idle()).await.is_err() {
            warn!(
                running = self.timers.running(),
                "timers still running after shutdown grace period"
            );
        }

        if self.config.jobs.hangup_on_exit {
            let runtime = Arc::clone(self);
            // stop_all blocks until every job has exited.
            if let Err(e) = tokio::task::spawn_blocking(move || runtime.jobs.stop_all()).await {
                error!("hanging up jobs failed: {e}");
            }
        }

        self.handle.shutdown();
        info!("shell runtime stopped");
    }

    pub fn report(&self) -> Report {
        Report {
            jobs: self.jobs.snapshot(),
            timers: self.timers.snapshot(),
        }
    }

    // --- private helpers ---------------------------------------------------

    fn install_hooks(&self) {
        self.bus.set_recoverer(|fault| {
            error!(event = %fault.event, "hook fault recovered: {fault}");
        });

        self.bus.on(JOB_ADD, |args| {
            if let Some(job) = job_arg(args) {
                info!(job_id = job.id(), cmd = job.cmd(), "job.add");
            }
        });
        self.bus.on(JOB_START, |args| {
            if let Some(job) = job_arg(args) {
                info!(job_id = job.id(), pid = job.pid(), "job.start");
            }
        });
        self.bus.on(JOB_DONE, |args| {
            if let Some(job) = job_arg(args) {
                info!(job_id = job.id(), exit_code = job.exit_code(), "job.done");
            }
        });
    }
}

fn job_arg(args: &[Value]) -> Option<&Arc<Job>> {
    args.first()?.as_userdata::<JobHandle>().map(JobHandle::job)
}

/// Split a command line on whitespace, honoring single and double quotes.
pub fn parse_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}
