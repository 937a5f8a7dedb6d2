use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use conch_core::script::{ScriptError, ScriptFunction, Value};

/// Name of the event that reports failing script listeners.
pub const ERROR_EVENT: &str = "error";

/// Native listener callback. Receives the emitted arguments as-is.
pub type NativeHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Called with every listener fault when one is installed.
pub type Recoverer = Arc<dyn Fn(&ListenerFault) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Native,
    Script,
}

/// What runs when an event fires.
#[derive(Clone)]
pub enum Handler {
    Native(NativeHandler),
    /// Called through the script engine's call queue.
    Script(ScriptFunction),
}

impl Handler {
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Handler::Native(Arc::new(f))
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            Handler::Native(_) => ListenerKind::Native,
            Handler::Script(_) => ListenerKind::Script,
        }
    }
}

impl From<ScriptFunction> for Handler {
    fn from(f: ScriptFunction) -> Self {
        Handler::Script(f)
    }
}

/// One registered reaction to a named event.
///
/// Native listeners are identified by this object (keep the `Arc` returned
/// from subscribing to remove it later); script listeners by their function.
pub struct Listener {
    event: String,
    handler: Handler,
    once: bool,
    /// Set by the first emission that claims a `once` listener.
    fired: AtomicBool,
    /// Set on removal so emissions already holding a snapshot skip it.
    removed: AtomicBool,
}

impl Listener {
    pub(crate) fn new(event: &str, handler: Handler, once: bool) -> Self {
        Self {
            event: event.to_string(),
            handler,
            once,
            fired: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn kind(&self) -> ListenerKind {
        self.handler.kind()
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn script_function(&self) -> Option<&ScriptFunction> {
        match &self.handler {
            Handler::Script(f) => Some(f),
            Handler::Native(_) => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// Returns `true` for exactly one caller over the listener's lifetime.
    pub(crate) fn claim_once(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    /// How scripts see this listener in an `error` payload.
    pub(crate) fn as_value(&self) -> Value {
        match &self.handler {
            Handler::Script(f) => Value::Function(f.clone()),
            Handler::Native(_) => Value::Nil,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .field("kind", &self.kind())
            .field("once", &self.once)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Selects a listener for removal.
#[derive(Debug, Clone, Copy)]
pub enum ListenerRef<'a> {
    Listener(&'a Arc<Listener>),
    Script(&'a ScriptFunction),
}

impl ListenerRef<'_> {
    pub(crate) fn matches(&self, candidate: &Arc<Listener>) -> bool {
        match self {
            ListenerRef::Listener(l) => Arc::ptr_eq(l, candidate),
            ListenerRef::Script(f) => candidate.script_function().is_some_and(|c| c.ptr_eq(f)),
        }
    }
}

impl<'a> From<&'a Arc<Listener>> for ListenerRef<'a> {
    fn from(l: &'a Arc<Listener>) -> Self {
        ListenerRef::Listener(l)
    }
}

impl<'a> From<&'a ScriptFunction> for ListenerRef<'a> {
    fn from(f: &'a ScriptFunction) -> Self {
        ListenerRef::Script(f)
    }
}

#[derive(Debug, Clone)]
pub enum FaultKind {
    /// The listener panicked.
    Panic(String),
    /// A listener for the `error` event itself raised a script error.
    ErrorHandlerFailed(ScriptError),
}

/// A listener failure that could not be handled as an ordinary script error.
#[derive(Debug, Clone)]
pub struct ListenerFault {
    pub event: String,
    pub listener: Arc<Listener>,
    pub kind: FaultKind,
}

impl fmt::Display for ListenerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::Panic(msg) => {
                write!(f, "listener for '{}' panicked: {msg}", self.event)
            }
            FaultKind::ErrorHandlerFailed(err) => {
                write!(f, "error handler for '{}' failed: {err}", self.event)
            }
        }
    }
}
