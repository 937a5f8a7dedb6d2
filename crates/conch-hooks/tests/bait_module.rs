// Drive the event bus the way scripts do: through the `bait` module, with
// script callbacks executed on the engine thread.

use std::sync::{Arc, Mutex};

use conch_core::script::{ClosureEngine, EngineHandle, ScriptError, Value};
use conch_hooks::{BaitModule, EventBus};

struct Shell {
    engine: ClosureEngine,
    handle: EngineHandle,
}

fn shell() -> Shell {
    let engine = ClosureEngine::new();
    let handle = EngineHandle::spawn(engine.clone()).unwrap();
    let bus = Arc::new(EventBus::new(handle.clone()));
    handle.load_module(Arc::new(BaitModule::new(bus))).unwrap();
    Shell { engine, handle }
}

fn bait(shell: &Shell, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
    shell.engine.call_module("bait", function, args)
}

#[test]
fn thrown_hook_reaches_caught_callback() {
    let shell = shell();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let cb = ClosureEngine::function(move |args| {
        seen2.lock().unwrap().extend_from_slice(args);
        Ok(Value::Nil)
    });
    bait(&shell, "catch", &[Value::from("cd"), Value::Function(cb)]).unwrap();

    // A script that throws the hook; it runs on the engine thread, so the
    // callback call nests inside it.
    let engine = shell.engine.clone();
    let script = ClosureEngine::function(move |_| {
        engine.call_module("bait", "throw", &[Value::from("cd"), Value::from("/tmp")])
    });
    shell.handle.call(&script, vec![]).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Value::from("/tmp")]);
}

#[test]
fn catch_once_fires_a_single_time() {
    let shell = shell();
    let hits = Arc::new(Mutex::new(0));
    let hits2 = Arc::clone(&hits);
    let cb = ClosureEngine::function(move |_| {
        *hits2.lock().unwrap() += 1;
        Ok(Value::Nil)
    });
    bait(&shell, "subscribeOnce", &[Value::from("prompt"), Value::Function(cb)]).unwrap();

    bait(&shell, "publish", &[Value::from("prompt")]).unwrap();
    bait(&shell, "publish", &[Value::from("prompt")]).unwrap();
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn hooks_lists_and_release_removes() {
    let shell = shell();
    let cb = ClosureEngine::function(|_| Ok(Value::Nil));
    let handle = bait(&shell, "catch", &[Value::from("exit"), Value::Function(cb.clone())]).unwrap();
    assert_eq!(handle, Value::Function(cb.clone()));

    let listed = bait(&shell, "hooks", &[Value::from("exit")]).unwrap();
    assert_eq!(listed, Value::list([cb.clone()]));

    bait(&shell, "release", &[Value::from("exit"), Value::Function(cb)]).unwrap();
    let err = bait(&shell, "listListeners", &[Value::from("exit")]).unwrap_err();
    assert_eq!(err.message(), "no hooks for event exit");
}

#[test]
fn failing_callback_surfaces_through_error_hook() {
    let shell = shell();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let reported2 = Arc::clone(&reported);
    let on_error = ClosureEngine::function(move |args| {
        reported2.lock().unwrap().extend_from_slice(args);
        Ok(Value::Nil)
    });
    let broken = ClosureEngine::function(|_| Err(ScriptError::new("attempt to call a nil value")));

    bait(&shell, "catch", &[Value::from("error"), Value::Function(on_error)]).unwrap();
    bait(&shell, "catch", &[Value::from("command.exit"), Value::Function(broken)]).unwrap();

    // The throw itself succeeds: the failure is reported, not propagated.
    assert!(bait(&shell, "throw", &[Value::from("command.exit"), Value::Int(0)]).is_ok());

    let reported = reported.lock().unwrap();
    assert_eq!(reported[0], Value::from("command.exit"));
    assert_eq!(reported[2], Value::from("attempt to call a nil value"));
}

#[test]
fn bad_arguments_are_script_errors() {
    let shell = shell();
    let err = bait(&shell, "catch", &[Value::from("x")]).unwrap_err();
    assert_eq!(err.message(), "missing argument #2");
    let err = bait(&shell, "catch", &[Value::from("x"), Value::Int(1)]).unwrap_err();
    assert_eq!(err.message(), "#2 must be a function");
    assert!(bait(&shell, "nope", &[]).is_err());
}
