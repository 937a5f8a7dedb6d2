// The `jobs` module and job handles as scripts see them.
#![cfg(unix)]

use std::sync::Arc;

use conch_core::config::JobsConfig;
use conch_core::script::{ClosureEngine, EngineHandle, ScriptError, UserData, Value};
use conch_hooks::EventBus;
use conch_jobs::{JobHandle, JobTable, JobsModule};

fn setup() -> (ClosureEngine, Arc<JobTable>) {
    let engine = ClosureEngine::new();
    let handle = EngineHandle::spawn(engine.clone()).unwrap();
    let bus = Arc::new(EventBus::new(handle.clone()));
    let table = Arc::new(JobTable::with_output(
        bus,
        &JobsConfig::default(),
        std::io::sink(),
        std::io::sink(),
    ));
    handle
        .load_module(Arc::new(JobsModule::new(Arc::clone(&table))))
        .unwrap();
    (engine, table)
}

fn jobs(engine: &ClosureEngine, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
    engine.call_module("jobs", function, args)
}

fn field(handle: &Value, name: &str) -> Value {
    match handle {
        Value::UserData(ud) => ud.get(name).unwrap_or(Value::Nil),
        other => panic!("not a handle: {other:?}"),
    }
}

#[test]
fn add_start_and_read_fields() {
    let (engine, _table) = setup();
    let job = jobs(
        &engine,
        "add",
        &[
            Value::from("echo hello"),
            Value::list(["echo", "hello"]),
            Value::from("/bin/echo"),
        ],
    )
    .unwrap();

    assert_eq!(field(&job, "id"), Value::Int(1));
    assert_eq!(field(&job, "cmd"), Value::from("echo hello"));
    assert_eq!(field(&job, "running"), Value::Bool(false));
    assert_eq!(field(&job, "nope"), Value::Nil);

    engine.call_method(&job, "start", &[]).unwrap();
    job.as_userdata::<JobHandle>().unwrap().job().wait();

    assert_eq!(field(&job, "running"), Value::Bool(false));
    assert_eq!(field(&job, "exitCode"), Value::Int(0));
    assert_eq!(field(&job, "stdout"), Value::from("hello\n"));
    assert_eq!(field(&job, "stderr"), Value::from(""));
}

#[test]
fn start_reports_launch_failure_through_exit_code() {
    let (engine, _table) = setup();
    let job = jobs(
        &engine,
        "addJob",
        &[Value::from("ghost"), Value::list(["ghost"]), Value::from("/no/such/ghost")],
    )
    .unwrap();
    engine.call_method(&job, "start", &[]).unwrap();
    assert_eq!(field(&job, "exitCode"), Value::Int(127));
    assert_eq!(field(&job, "running"), Value::Bool(false));
}

#[test]
fn queries_return_nil_for_missing_jobs() {
    let (engine, table) = setup();
    assert!(jobs(&engine, "last", &[]).unwrap().is_nil());
    assert!(jobs(&engine, "get", &[Value::Int(7)]).unwrap().is_nil());
    assert!(jobs(&engine, "get", &[Value::Int(-1)]).unwrap().is_nil());

    table.add("a", vec!["a".into()], "/bin/true");
    table.add("b", vec!["b".into()], "/bin/true");

    let last = jobs(&engine, "last", &[]).unwrap();
    assert_eq!(field(&last, "id"), Value::Int(2));
    let got = jobs(&engine, "get", &[Value::Int(1)]).unwrap();
    assert_eq!(field(&got, "cmd"), Value::from("a"));

    let Value::Table(all) = jobs(&engine, "all", &[]).unwrap() else {
        panic!("all() must return a table");
    };
    let ids: Vec<_> = all.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn disown_and_method_errors() {
    let (engine, table) = setup();
    let err = jobs(&engine, "disown", &[Value::Int(3)]).unwrap_err();
    assert_eq!(err.message(), "job doesn't exist");

    let job = table.add("sleep", vec!["sleep".into(), "30".into()], "/bin/sleep");
    let handle = Value::userdata(job.handle());
    let err = engine.call_method(&handle, "foreground", &[]).unwrap_err();
    assert_eq!(err.message(), "job not running");
    let err = engine.call_method(&handle, "background", &[]).unwrap_err();
    assert_eq!(err.message(), "job not running");
    // Stopping a job that is not running does nothing.
    engine.call_method(&handle, "stop", &[]).unwrap();

    jobs(&engine, "disown", &[Value::Int(1)]).unwrap();
    assert!(table.get(1).is_none());
}

#[test]
fn add_validates_arguments() {
    let (engine, _table) = setup();
    let err = jobs(&engine, "add", &[Value::from("x")]).unwrap_err();
    assert_eq!(err.message(), "missing argument #2");
    let err = jobs(
        &engine,
        "add",
        &[Value::from("x"), Value::from("not a table"), Value::from("/bin/x")],
    )
    .unwrap_err();
    assert_eq!(err.message(), "#2 must be a table");
}
