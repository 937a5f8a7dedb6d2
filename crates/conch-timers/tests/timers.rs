use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conch_core::script::{ClosureEngine, EngineHandle, ScriptError, ScriptFunction, Value};
use conch_timers::{Timer, TimerError, TimerKind, TimerScheduler};

fn scheduler() -> TimerScheduler {
    TimerScheduler::current(EngineHandle::spawn(ClosureEngine::new()).unwrap())
}

fn counter() -> (Arc<AtomicUsize>, ScriptFunction) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let f = ClosureEngine::function(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Nil)
    });
    (count, f)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interval_fires_until_stopped() {
    let sched = scheduler();
    let (count, f) = counter();
    let timer = sched.create(TimerKind::Interval, Duration::from_millis(10), f);

    timer.start().unwrap();
    assert!(timer.is_running());
    assert_eq!(sched.running(), 1);

    wait_until("three firings", || count.load(Ordering::SeqCst) >= 3).await;
    let observed = count.load(Ordering::SeqCst);
    timer.stop().unwrap();
    let at_stop = count.load(Ordering::SeqCst);
    assert!(at_stop >= observed && at_stop <= observed + 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(count.load(Ordering::SeqCst), at_stop);
    assert!(!timer.is_running());
    assert_eq!(sched.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_firing_waits_a_full_duration() {
    let sched = scheduler();
    let (count, f) = counter();
    let timer = sched.create(TimerKind::Interval, Duration::from_millis(300), f);
    timer.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    timer.stop().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_fires_once_and_stops_itself() {
    let sched = scheduler();
    let (count, f) = counter();
    let timer = sched.create(TimerKind::Timeout, Duration::from_millis(10), f);
    timer.start().unwrap();

    sched.wait_idle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!timer.is_running());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(matches!(timer.stop(), Err(TimerError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_and_stop_report_state_errors() {
    let sched = scheduler();
    let (_, f) = counter();
    let timer = sched.create(TimerKind::Interval, Duration::from_secs(60), f);

    let err = timer.stop().unwrap_err();
    assert_eq!(err.to_string(), "timer not running");

    timer.start().unwrap();
    let err = timer.start().unwrap_err();
    assert_eq!(err.to_string(), "timer already running");
    assert_eq!(sched.running(), 1);

    timer.stop().unwrap();
    assert_eq!(sched.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_callback_stops_the_timer() {
    let sched = scheduler();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let f = ClosureEngine::function(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Err(ScriptError::new("attempt to index a nil value"))
    });
    let timer = sched.create(TimerKind::Interval, Duration::from_millis(10), f);
    timer.start().unwrap();

    sched.wait_idle().await;
    assert!(!timer.is_running());
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_can_stop_its_own_timer() {
    let sched = scheduler();
    let slot: Arc<Mutex<Option<Arc<Timer>>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));

    let slot2 = Arc::clone(&slot);
    let c = Arc::clone(&calls);
    let f = ClosureEngine::function(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        let timer = slot2.lock().unwrap().clone();
        if let Some(timer) = timer {
            timer.stop()?;
        }
        Ok(Value::Nil)
    });
    let timer = sched.create(TimerKind::Interval, Duration::from_millis(10), f);
    *slot.lock().unwrap() = Some(Arc::clone(&timer));
    timer.start().unwrap();

    sched.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!timer.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_timer_can_be_restarted() {
    let sched = scheduler();
    let (count, f) = counter();
    let timer = sched.create(TimerKind::Timeout, Duration::from_millis(10), f);

    timer.start().unwrap();
    sched.wait_idle().await;
    timer.start().unwrap();
    sched.wait_idle().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_all_lets_wait_idle_resolve() {
    let sched = Arc::new(scheduler());
    for _ in 0..3 {
        let (_, f) = counter();
        sched
            .create(TimerKind::Interval, Duration::from_millis(20), f)
            .start()
            .unwrap();
    }
    assert_eq!(sched.running(), 3);

    let waiter = {
        let sched = Arc::clone(&sched);
        tokio::spawn(async move { sched.wait_idle().await })
    };
    sched.stop_all();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("wait_idle did not resolve")
        .unwrap();
    assert!(sched.all().iter().all(|t| !t.is_running()));
}

#[tokio::test]
async fn ids_are_sequential_and_lookup_works() {
    let sched = scheduler();
    let (_, f) = counter();
    let a = sched.create(TimerKind::Interval, Duration::from_secs(1), f.clone());
    let b = sched.create(TimerKind::Timeout, Duration::from_secs(1), f);
    assert_eq!((a.id(), b.id()), (1, 2));
    assert_eq!(sched.get(2).unwrap().kind(), TimerKind::Timeout);
    assert!(sched.get(3).is_none());

    let json = serde_json::to_value(sched.snapshot()).unwrap();
    assert_eq!(json[0]["kind"], "interval");
    assert_eq!(json[1]["duration_ms"], 1000);
    assert_eq!(json[1]["running"], false);
}
