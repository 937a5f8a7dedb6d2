//! Single-consumer call queue in front of a non-reentrant scripting engine.
//!
//! One dedicated OS thread owns the engine. Every other thread (job waiters,
//! timer tasks, the interactive loop) submits work through [`EngineHandle`]
//! and blocks or awaits the reply, so only one call is ever in flight.
//!
//! Work submitted *from* the engine thread runs inline: that only happens
//! when a script called into native code which now calls back into scripts,
//! and queueing it would deadlock the worker on itself.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::script::{ScriptError, ScriptFunction, ScriptModule, Value};

/// The embedded scripting runtime, as seen by the shell core.
///
/// Implementations may assume calls never overlap: [`EngineHandle`] only
/// invokes them from its worker thread (or re-entrantly from inside a call
/// already running on that thread).
pub trait ScriptEngine: Send + Sync + 'static {
    /// Call a script function with `args` and return its first result.
    fn call(&self, func: &ScriptFunction, args: Vec<Value>) -> Result<Value, ScriptError>;

    /// Make a native module visible to scripts under `module.name()`.
    fn load_module(&self, module: Arc<dyn ScriptModule>) -> Result<(), ScriptError>;
}

type Task = Box<dyn FnOnce(&dyn ScriptEngine) + Send>;

/// Cloneable handle to the engine worker.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn ScriptEngine>,
    /// `None` once the handle has been shut down.
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl EngineHandle {
    /// Move `engine` onto a dedicated worker thread.
    pub fn spawn<E: ScriptEngine>(engine: E) -> Result<Self, EngineError> {
        let engine: Arc<dyn ScriptEngine> = Arc::new(engine);
        let (tx, rx) = mpsc::channel::<Task>();

        let worker_engine = Arc::clone(&engine);
        let worker = thread::Builder::new()
            .name("conch-engine".to_string())
            .spawn(move || {
                // Drains until every sender is gone, then exits.
                while let Ok(task) = rx.recv() {
                    task(&*worker_engine);
                }
                debug!("engine worker exited");
            })
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let worker_id = worker.thread().id();
        info!("script engine worker started");

        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                tx: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
                worker_id,
            }),
        })
    }

    /// True when the current thread is the engine worker.
    pub fn on_engine_thread(&self) -> bool {
        thread::current().id() == self.inner.worker_id
    }

    /// Run `f` against the engine on the engine thread and block for the result.
    ///
    /// A panic inside `f` is re-raised on the calling thread.
    pub fn run<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn ScriptEngine) -> R + Send + 'static,
    {
        if self.on_engine_thread() {
            return Ok(f(&*self.inner.engine));
        }

        // std channel: blocking here must also work from inside an async context.
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.submit(Box::new(move |engine| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(engine)));
            let _ = reply_tx.send(result);
        }))?;

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(EngineError::Dropped),
        }
    }

    /// Async counterpart of [`EngineHandle::run`].
    pub async fn run_async<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn ScriptEngine) -> R + Send + 'static,
    {
        if self.on_engine_thread() {
            return Ok(f(&*self.inner.engine));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Box::new(move |engine| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(engine)));
            let _ = reply_tx.send(result);
        }))?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(EngineError::Dropped),
        }
    }

    /// Call a script function, blocking until it returns.
    pub fn call(&self, func: &ScriptFunction, args: Vec<Value>) -> Result<Value, ScriptError> {
        let func = func.clone();
        self.run(move |engine| engine.call(&func, args))?
    }

    /// Call a script function from an async task.
    pub async fn call_async(
        &self,
        func: &ScriptFunction,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let func = func.clone();
        self.run_async(move |engine| engine.call(&func, args)).await?
    }

    /// Expose a native module to scripts.
    pub fn load_module(&self, module: Arc<dyn ScriptModule>) -> Result<(), ScriptError> {
        let name = module.name();
        self.run(move |engine| engine.load_module(module))??;
        debug!(module = name, "script module loaded");
        Ok(())
    }

    /// Stop accepting calls, let the worker drain what is queued, and join it.
    ///
    /// Idempotent. When called from the engine thread the worker is not
    /// joined (it would wait on itself); it exits after the current task.
    pub fn shutdown(&self) {
        let tx = self.inner.tx.lock().expect("engine sender poisoned").take();
        if tx.is_none() {
            return;
        }
        drop(tx);

        if self.on_engine_thread() {
            return;
        }
        let worker = self.inner.worker.lock().expect("engine worker poisoned").take();
        if let Some(worker) = worker {
            let _ = worker.join();
            info!("script engine worker stopped");
        }
    }

    fn submit(&self, task: Task) -> Result<(), EngineError> {
        let guard = self.inner.tx.lock().expect("engine sender poisoned");
        let tx = guard.as_ref().ok_or(EngineError::Closed)?;
        tx.send(task).map_err(|_| EngineError::Closed)
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("worker", &self.inner.worker_id)
            .finish()
    }
}
