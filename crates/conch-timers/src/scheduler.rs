use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use conch_core::script::{EngineHandle, ScriptFunction};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::TimerError;
use crate::timer::{Shared, Timer};
use crate::types::{TimerInfo, TimerKind};

/// Registry of every timer the shell created.
///
/// Timer tasks are spawned on the runtime handle given at construction, so
/// timers can be started from any thread, the engine thread included.
pub struct TimerScheduler {
    shared: Arc<Shared>,
    timers: RwLock<BTreeMap<u64, Arc<Timer>>>,
    latest_id: AtomicU64,
}

impl TimerScheduler {
    pub fn new(engine: EngineHandle, runtime: Handle) -> Self {
        let (running, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                engine,
                runtime,
                running,
            }),
            timers: RwLock::new(BTreeMap::new()),
            latest_id: AtomicU64::new(0),
        }
    }

    /// Scheduler bound to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current(engine: EngineHandle) -> Self {
        Self::new(engine, Handle::current())
    }

    /// Register a timer. It does not run until started.
    ///
    /// A zero duration is raised to one millisecond.
    pub fn create(&self, kind: TimerKind, duration: Duration, callback: ScriptFunction) -> Arc<Timer> {
        let id = self.latest_id.fetch_add(1, Ordering::SeqCst) + 1;
        let duration = duration.max(Duration::from_millis(1));
        let timer = Arc::new(Timer::new(
            id,
            kind,
            duration,
            callback,
            Arc::clone(&self.shared),
        ));
        self.timers
            .write()
            .expect("timer registry poisoned")
            .insert(id, Arc::clone(&timer));
        debug!(timer_id = id, %kind, duration_ms = duration.as_millis() as u64, "timer created");
        timer
    }

    pub fn get(&self, id: u64) -> Option<Arc<Timer>> {
        self.timers
            .read()
            .expect("timer registry poisoned")
            .get(&id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<Timer>> {
        self.timers
            .read()
            .expect("timer registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<TimerInfo> {
        self.all().iter().map(|t| t.info()).collect()
    }

    /// Number of timers currently running.
    pub fn running(&self) -> usize {
        *self.shared.running.borrow()
    }

    /// Resolve once no timer is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.running.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop every running timer.
    pub fn stop_all(&self) {
        let running: Vec<_> = self.all().into_iter().filter(|t| t.is_running()).collect();
        if running.is_empty() {
            return;
        }
        info!(count = running.len(), "stopping all timers");
        for timer in running {
            match timer.stop() {
                // Stopped itself in the meantime.
                Ok(()) | Err(TimerError::NotRunning) => {}
                Err(e) => debug!(timer_id = timer.id(), "stop failed: {e}"),
            }
        }
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("timers", &self.timers.read().expect("timer registry poisoned").len())
            .field("running", &self.running())
            .finish()
    }
}
