use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use conch_core::script::{EngineHandle, ScriptError, ScriptFunction, Value};
use tracing::{debug, error, warn};

use crate::error::{HookError, Result};
use crate::types::{
    FaultKind, Handler, Listener, ListenerFault, ListenerRef, Recoverer, ERROR_EVENT,
};

/// Named-event publish/subscribe registry shared by the whole shell.
///
/// Construct one per shell and pass it around as `Arc<EventBus>`.
///
/// Emission works on a snapshot of the listener list, so listeners may
/// subscribe or unsubscribe (themselves included) while an event is being
/// delivered. Removal swaps the last listener into the freed slot: the
/// relative order of the remaining listeners is not preserved.
pub struct EventBus {
    engine: EngineHandle,
    listeners: RwLock<HashMap<String, Vec<Arc<Listener>>>>,
    recoverer: RwLock<Option<Recoverer>>,
}

impl EventBus {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            listeners: RwLock::new(HashMap::new()),
            recoverer: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Register `handler` for `event`. Any string is a valid event name.
    pub fn subscribe(&self, event: &str, handler: Handler, once: bool) -> Arc<Listener> {
        let listener = Arc::new(Listener::new(event, handler, once));
        let mut map = self.listeners.write().expect("listener registry poisoned");
        map.entry(event.to_string())
            .or_default()
            .push(Arc::clone(&listener));
        debug!(event, kind = ?listener.kind(), once, "listener registered");
        listener
    }

    pub fn on<F>(&self, event: &str, f: F) -> Arc<Listener>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscribe(event, Handler::native(f), false)
    }

    pub fn once<F>(&self, event: &str, f: F) -> Arc<Listener>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscribe(event, Handler::native(f), true)
    }

    pub fn on_script(&self, event: &str, func: ScriptFunction) -> Arc<Listener> {
        self.subscribe(event, Handler::Script(func), false)
    }

    pub fn once_script(&self, event: &str, func: ScriptFunction) -> Arc<Listener> {
        self.subscribe(event, Handler::Script(func), true)
    }

    /// Remove the first listener of `event` matching `target`.
    ///
    /// Returns whether anything was removed; a miss is not an error.
    pub fn unsubscribe<'a>(&self, event: &str, target: impl Into<ListenerRef<'a>>) -> bool {
        let target = target.into();
        let mut map = self.listeners.write().expect("listener registry poisoned");
        let Some(list) = map.get_mut(event) else {
            return false;
        };
        let Some(idx) = list.iter().position(|l| target.matches(l)) else {
            return false;
        };

        let removed = list.swap_remove(idx);
        removed.mark_removed();
        if list.is_empty() {
            map.remove(event);
        }
        debug!(event, "listener unregistered");
        true
    }

    pub fn off(&self, event: &str, listener: &Arc<Listener>) -> bool {
        self.unsubscribe(event, listener)
    }

    pub fn off_script(&self, event: &str, func: &ScriptFunction) -> bool {
        self.unsubscribe(event, func)
    }

    /// Install the callback that receives listener faults.
    ///
    /// Without one, a fault is re-raised as a panic on the emitting thread.
    pub fn set_recoverer<F>(&self, f: F)
    where
        F: Fn(&ListenerFault) + Send + Sync + 'static,
    {
        *self.recoverer.write().expect("recoverer poisoned") = Some(Arc::new(f));
    }

    /// Deliver `event` to every listener registered when the call starts, in
    /// registration order, blocking until all of them have run.
    ///
    /// A script error in one listener fires [`ERROR_EVENT`] with
    /// `(event, listener, message)` and delivery continues with the next
    /// listener. A failing `error` listener or a panic anywhere becomes a
    /// [`ListenerFault`] for the recoverer.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let snapshot = {
            let map = self.listeners.read().expect("listener registry poisoned");
            match map.get(event) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        debug!(event, listeners = snapshot.len(), "emitting event");

        for listener in snapshot {
            if listener.is_removed() {
                continue;
            }
            if listener.is_once() && !listener.claim_once() {
                continue;
            }
            // Removed once this iteration ends, also when a fault unwinds out.
            let _once = listener.is_once().then(|| OnceRemoval {
                bus: self,
                event,
                listener: &listener,
            });

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.invoke(&listener, args)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) if event != ERROR_EVENT => {
                    warn!(event, error = %err, "script listener failed");
                    self.emit(
                        ERROR_EVENT,
                        &[
                            Value::from(event),
                            listener.as_value(),
                            Value::from(err.message()),
                        ],
                    );
                }
                Ok(Err(err)) => {
                    // Re-emitting here would loop forever on a broken handler.
                    let fault = ListenerFault {
                        event: event.to_string(),
                        listener: Arc::clone(&listener),
                        kind: FaultKind::ErrorHandlerFailed(err),
                    };
                    self.recover(fault, None);
                }
                Err(payload) => {
                    let fault = ListenerFault {
                        event: event.to_string(),
                        listener: Arc::clone(&listener),
                        kind: FaultKind::Panic(panic_message(payload.as_ref())),
                    };
                    self.recover(fault, Some(payload));
                }
            }
        }
    }

    /// Script listeners currently registered for `event`. Native listeners
    /// are not included.
    pub fn script_listeners(&self, event: &str) -> Result<Vec<ScriptFunction>> {
        let map = self.listeners.read().expect("listener registry poisoned");
        let funcs: Vec<ScriptFunction> = map
            .get(event)
            .map(|list| {
                list.iter()
                    .filter_map(|l| l.script_function().cloned())
                    .collect()
            })
            .unwrap_or_default();

        if funcs.is_empty() {
            return Err(HookError::NoHooks {
                event: event.to_string(),
            });
        }
        Ok(funcs)
    }

    /// Listeners of every kind registered for `event`, in storage order.
    pub fn listeners(&self, event: &str) -> Vec<Arc<Listener>> {
        self.listeners
            .read()
            .expect("listener registry poisoned")
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .expect("listener registry poisoned")
            .get(event)
            .map_or(0, Vec::len)
    }

    // --- private helpers ---------------------------------------------------

    fn invoke(&self, listener: &Listener, args: &[Value]) -> std::result::Result<(), ScriptError> {
        match listener.handler() {
            Handler::Native(f) => {
                f(args);
                Ok(())
            }
            Handler::Script(func) => self.engine.call(func, args.to_vec()).map(|_| ()),
        }
    }

    fn recover(&self, fault: ListenerFault, payload: Option<Box<dyn Any + Send>>) {
        error!(event = %fault.event, "{fault}");
        let recoverer = self.recoverer.read().expect("recoverer poisoned").clone();
        match (recoverer, payload) {
            (Some(recoverer), _) => recoverer(&fault),
            (None, Some(payload)) => panic::resume_unwind(payload),
            (None, None) => panic!("{fault}"),
        }
    }
}

/// Unsubscribes a claimed `once` listener when dropped.
struct OnceRemoval<'a> {
    bus: &'a EventBus,
    event: &'a str,
    listener: &'a Arc<Listener>,
}

impl Drop for OnceRemoval<'_> {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.event, self.listener);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conch_core::script::ClosureEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn bus() -> EventBus {
        EventBus::new(EngineHandle::spawn(ClosureEngine::new()).unwrap())
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let make = move |name: &'static str| {
            let log = Arc::clone(&log2);
            Handler::native(move |_| log.lock().unwrap().push(name.to_string()))
        };
        (log, make)
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let bus = bus();
        bus.emit("nothing.here", &[Value::Int(1)]);
        assert_eq!(bus.listener_count("nothing.here"), 0);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let bus = bus();
        let (log, make) = recorder();
        bus.subscribe("ev", make("a"), false);
        bus.subscribe("ev", make("b"), false);
        bus.subscribe("ev", make("c"), false);
        bus.emit("ev", &[]);
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn native_listeners_receive_arguments() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        bus.on("ev", move |args| seen2.lock().unwrap().extend_from_slice(args));
        bus.emit("ev", &[Value::from("x"), Value::Int(2)]);
        assert_eq!(*seen.lock().unwrap(), vec![Value::from("x"), Value::Int(2)]);
    }

    #[test]
    fn once_listener_runs_once() {
        let bus = bus();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.once("ev", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit("ev", &[]);
        bus.emit("ev", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("ev"), 0);
    }

    #[test]
    fn removal_swaps_last_into_place() {
        let bus = bus();
        let (log, make) = recorder();
        let a = bus.subscribe("ev", make("a"), false);
        bus.subscribe("ev", make("b"), false);
        bus.subscribe("ev", make("c"), false);

        assert!(bus.off("ev", &a));
        bus.emit("ev", &[]);
        assert_eq!(*log.lock().unwrap(), ["c", "b"]);
    }

    #[test]
    fn unsubscribe_miss_is_not_an_error() {
        let bus = bus();
        let l = bus.on("ev", |_| {});
        assert!(!bus.off("other", &l));
        assert!(bus.off("ev", &l));
        assert!(!bus.off("ev", &l));
        let f = ClosureEngine::function(|_| Ok(Value::Nil));
        assert!(!bus.off_script("ev", &f));
    }

    #[test]
    fn unsubscribe_removes_only_first_match() {
        let bus = bus();
        let f = ClosureEngine::function(|_| Ok(Value::Nil));
        bus.on_script("ev", f.clone());
        bus.on_script("ev", f.clone());
        assert!(bus.off_script("ev", &f));
        assert_eq!(bus.listener_count("ev"), 1);
    }

    #[test]
    fn listener_removed_mid_emission_is_skipped() {
        let bus = Arc::new(bus());
        let (log, make) = recorder();
        let victim: Arc<Mutex<Option<Arc<Listener>>>> = Arc::new(Mutex::new(None));

        let bus2 = Arc::clone(&bus);
        let victim2 = Arc::clone(&victim);
        bus.on("ev", move |_| {
            if let Some(v) = victim2.lock().unwrap().take() {
                bus2.off("ev", &v);
            }
        });
        let v = bus.subscribe("ev", make("victim"), false);
        bus.subscribe("ev", make("after"), false);
        *victim.lock().unwrap() = Some(v);

        bus.emit("ev", &[]);
        assert_eq!(*log.lock().unwrap(), ["after"]);
    }

    #[test]
    fn listener_added_mid_emission_waits_for_next_emit() {
        let bus = Arc::new(bus());
        let count = Arc::new(AtomicUsize::new(0));

        let bus2 = Arc::clone(&bus);
        let count2 = Arc::clone(&count);
        bus.once("ev", move |_| {
            let c = Arc::clone(&count2);
            bus2.on("ev", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit("ev", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.emit("ev", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn script_error_fires_error_event_and_delivery_continues() {
        let bus = bus();
        let failing = ClosureEngine::function(|_| Err(ScriptError::new("bad hook")));
        bus.on_script("ev", failing.clone());
        let (log, make) = recorder();
        bus.subscribe("ev", make("next"), false);

        let payload = Arc::new(Mutex::new(Vec::new()));
        let payload2 = Arc::clone(&payload);
        bus.on(ERROR_EVENT, move |args| payload2.lock().unwrap().extend_from_slice(args));

        bus.emit("ev", &[]);

        let payload = payload.lock().unwrap();
        assert_eq!(payload.len(), 3);
        assert_eq!(payload[0], Value::from("ev"));
        assert_eq!(payload[1], Value::Function(failing));
        assert_eq!(payload[2], Value::from("bad hook"));
        assert_eq!(*log.lock().unwrap(), ["next"]);
    }

    #[test]
    fn failing_error_handler_goes_to_recoverer_once() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        bus.on_script(
            ERROR_EVENT,
            ClosureEngine::function(move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Err(ScriptError::new("handler is broken too"))
            }),
        );
        bus.on_script("ev", ClosureEngine::function(|_| Err(ScriptError::new("first"))));

        let faults = Arc::new(Mutex::new(Vec::new()));
        let faults2 = Arc::clone(&faults);
        bus.set_recoverer(move |fault| faults2.lock().unwrap().push(fault.clone()));

        bus.emit("ev", &[]);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].event, ERROR_EVENT);
        assert!(matches!(faults[0].kind, FaultKind::ErrorHandlerFailed(_)));
    }

    #[test]
    #[should_panic(expected = "error handler for 'error' failed")]
    fn failing_error_handler_without_recoverer_is_fatal() {
        let bus = bus();
        bus.on_script(
            ERROR_EVENT,
            ClosureEngine::function(|_| Err(ScriptError::new("broken"))),
        );
        bus.emit(ERROR_EVENT, &[]);
    }

    #[test]
    fn once_listener_is_removed_when_its_panic_escapes() {
        let bus = bus();
        bus.once("ev", |_| panic!("no recoverer"));

        let escaped = panic::catch_unwind(AssertUnwindSafe(|| bus.emit("ev", &[])));
        assert!(escaped.is_err());
        assert_eq!(bus.listener_count("ev"), 0);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = bus();
        bus.on("ev", |_| panic!("native boom"));
        let (log, make) = recorder();
        bus.subscribe("ev", make("survivor"), false);

        let faults = Arc::new(Mutex::new(Vec::new()));
        let faults2 = Arc::clone(&faults);
        bus.set_recoverer(move |fault| faults2.lock().unwrap().push(fault.to_string()));

        bus.emit("ev", &[]);

        assert_eq!(*log.lock().unwrap(), ["survivor"]);
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].contains("native boom"));
    }

    #[test]
    fn panic_inside_script_call_is_a_fault() {
        let bus = bus();
        bus.on_script("ev", ClosureEngine::function(|_| panic!("script side boom")));
        let faults = Arc::new(AtomicUsize::new(0));
        let faults2 = Arc::clone(&faults);
        bus.set_recoverer(move |fault| {
            assert!(matches!(fault.kind, FaultKind::Panic(_)));
            faults2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit("ev", &[]);
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "unrecovered")]
    fn panic_without_recoverer_is_reraised() {
        let bus = bus();
        bus.on("ev", |_| panic!("unrecovered"));
        bus.emit("ev", &[]);
    }

    #[test]
    fn script_listener_query_skips_native_listeners() {
        let bus = bus();
        bus.on("ev", |_| {});
        let err = bus.script_listeners("ev").unwrap_err();
        assert_eq!(err.to_string(), "no hooks for event ev");

        let f = ClosureEngine::function(|_| Ok(Value::Nil));
        bus.on_script("ev", f.clone());
        assert_eq!(bus.script_listeners("ev").unwrap(), vec![f]);
        assert!(bus.script_listeners("unknown").is_err());
    }

    #[test]
    fn concurrent_emits_run_once_listener_once() {
        let bus = Arc::new(bus());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.once("ev", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || bus.emit("ev", &[]))
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
