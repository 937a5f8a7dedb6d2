use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use conch_core::script::{EngineHandle, ScriptFunction};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TimerError};
use crate::handle::TimerHandle;
use crate::types::{TimerInfo, TimerKind};

/// State every timer of one scheduler shares.
pub(crate) struct Shared {
    pub engine: EngineHandle,
    pub runtime: Handle,
    /// Number of running timers; receivers wait for it to reach zero.
    pub running: watch::Sender<usize>,
}

impl Shared {
    fn inc(&self) {
        self.running.send_modify(|n| *n += 1);
    }

    fn dec(&self) {
        self.running.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A scheduled script callback.
///
/// Each start spawns one task that ticks every `duration`; stopping cancels
/// it. A stopped timer can be started again.
pub struct Timer {
    id: u64,
    kind: TimerKind,
    duration: Duration,
    callback: ScriptFunction,
    shared: Arc<Shared>,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    running: bool,
    /// Bumped on every start so a task from an earlier run never fires.
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
}

impl Timer {
    pub(crate) fn new(
        id: u64,
        kind: TimerKind,
        duration: Duration,
        callback: ScriptFunction,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            kind,
            duration,
            callback,
            shared,
            state: Mutex::new(TimerState::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn info(&self) -> TimerInfo {
        TimerInfo {
            id: self.id,
            kind: self.kind,
            duration_ms: self.duration.as_millis() as u64,
            running: self.is_running(),
        }
    }

    pub fn handle(self: &Arc<Self>) -> TimerHandle {
        TimerHandle::new(Arc::clone(self))
    }

    /// Start ticking. The first firing happens one full `duration` from now.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let (generation, cancel_rx) = {
            let mut state = self.lock();
            if state.running {
                return Err(TimerError::AlreadyRunning);
            }
            let (cancel_tx, cancel_rx) = oneshot::channel();
            state.running = true;
            state.generation += 1;
            state.cancel = Some(cancel_tx);
            (state.generation, cancel_rx)
        };
        self.shared.inc();

        info!(timer_id = self.id, kind = %self.kind, duration_ms = self.duration.as_millis() as u64, "timer started");
        let timer = Arc::clone(self);
        self.shared
            .runtime
            .spawn(async move { timer.run(generation, cancel_rx).await });
        Ok(())
    }

    /// Stop the timer.
    ///
    /// Stopping is serialized with firings on the engine thread: once this
    /// returns, a firing is either complete or will never start.
    pub fn stop(self: &Arc<Self>) -> Result<()> {
        if self.shared.engine.on_engine_thread() {
            return self.stop_now();
        }
        let timer = Arc::clone(self);
        match self.shared.engine.run(move |_| timer.stop_now()) {
            Ok(result) => result,
            // No engine left to race with.
            Err(_) => self.stop_now(),
        }
    }

    // --- private helpers ---------------------------------------------------

    fn stop_now(&self) -> Result<()> {
        let cancel = {
            let mut state = self.lock();
            if !state.running {
                return Err(TimerError::NotRunning);
            }
            state.running = false;
            state.cancel.take()
        };
        if let Some(cancel) = cancel {
            // The task may already be gone; nothing to tell it then.
            let _ = cancel.send(());
        }
        self.shared.dec();
        info!(timer_id = self.id, "timer stopped");
        Ok(())
    }

    /// Stop from inside the timer's own task, unless the run it belongs to
    /// has already ended.
    fn finish(&self, generation: u64) {
        {
            let mut state = self.lock();
            if !state.running || state.generation != generation {
                return;
            }
            state.running = false;
            state.cancel = None;
        }
        self.shared.dec();
        debug!(timer_id = self.id, "timer finished");
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.running && state.generation == generation
    }

    async fn run(self: Arc<Self>, generation: u64, mut cancel: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut cancel => {
                    debug!(timer_id = self.id, "timer task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let timer = Arc::clone(&self);
                    let fired = self
                        .shared
                        .engine
                        .run_async(move |engine| {
                            // Checked on the engine thread, where stop() also runs.
                            if !timer.is_current(generation) {
                                return None;
                            }
                            Some(engine.call(&timer.callback, Vec::new()))
                        })
                        .await;

                    match fired {
                        Ok(None) => break,
                        Ok(Some(Ok(_))) => {
                            if self.kind == TimerKind::Timeout {
                                self.finish(generation);
                                break;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            error!(timer_id = self.id, "error in timer callback: {e}");
                            self.finish(generation);
                            break;
                        }
                        Err(e) => {
                            warn!(timer_id = self.id, "timer cannot fire: {e}");
                            self.finish(generation);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().expect("timer state poisoned")
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("duration", &self.duration)
            .field("running", &self.is_running())
            .finish()
    }
}
