//! Main Context Dispatcher Integration Tests
//!
//! Exercises every dispatch variant against a dedicated main thread, checking
//! where work runs, how failures surface, and continuation ordering.

use engine_bridge::{
    DedicatedThreadContext, DispatchError, LogLevel, MainContextDispatcher, MemorySink, TaskState,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

const MAIN: &str = "engine-main-test";

struct Harness {
    dispatcher: MainContextDispatcher,
    context: Arc<DedicatedThreadContext>,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new() -> Self {
        let context = DedicatedThreadContext::start(MAIN).expect("main context starts");
        let sink = Arc::new(MemorySink::new());
        let dispatcher = MainContextDispatcher::with_sink(context.clone(), sink.clone());
        Self {
            dispatcher,
            context,
            sink,
        }
    }

    fn main_thread_id(&self) -> ThreadId {
        self.dispatcher
            .send(|| std::thread::current().id())
            .expect("main context answers")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.context.shutdown();
    }
}

fn current_thread_name() -> Option<String> {
    std::thread::current().name().map(str::to_string)
}

#[tokio::test]
async fn test_successful_work_logs_no_failure() {
    let harness = Harness::new();

    let name = harness
        .dispatcher
        .schedule(|| Ok::<_, anyhow::Error>(current_thread_name()))
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some(MAIN));

    harness.dispatcher.schedule_action(|| {}).await.unwrap();
    assert_eq!(harness.sink.failure_count(), 0);
}

#[tokio::test]
async fn test_failing_work_logs_exactly_once() {
    let harness = Harness::new();

    let outcome = harness
        .dispatcher
        .schedule(|| -> anyhow::Result<()> { anyhow::bail!("texture upload failed") })
        .await;

    assert!(matches!(outcome, Err(DispatchError::Failed(_))));
    let failures = harness.sink.records_at(LogLevel::Exception);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("texture upload failed"));
}

#[tokio::test]
async fn test_panicking_action_fails_task_and_logs() {
    let harness = Harness::new();

    let task = harness
        .dispatcher
        .schedule_action(|| panic!("scene graph poisoned"));
    let outcome = task.await;

    assert!(matches!(outcome, Err(DispatchError::Panicked(ref m)) if m == "scene graph poisoned"));
    assert_eq!(harness.sink.failure_count(), 1);

    // The main context survives the panic.
    assert_eq!(harness.dispatcher.send(|| 1 + 1).unwrap(), 2);
}

#[test]
fn test_send_returns_only_after_work_finished() {
    let harness = Harness::new();
    let applied = Arc::new(AtomicBool::new(false));

    let worker = {
        let dispatcher = harness.dispatcher.clone();
        let applied = applied.clone();
        std::thread::spawn(move || {
            let applied_in_task = applied.clone();
            dispatcher
                .send(move || {
                    std::thread::sleep(Duration::from_millis(25));
                    applied_in_task.store(true, Ordering::SeqCst);
                })
                .unwrap();
            // Visible immediately after send returns.
            applied.load(Ordering::SeqCst)
        })
    };

    assert!(worker.join().unwrap());
}

#[test]
fn test_post_runs_in_order_without_waiting() {
    let harness = Harness::new();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for i in 0..10 {
        let log = log.clone();
        harness.dispatcher.post(move || log.lock().push(i));
    }
    // A send queued behind the posts acts as a barrier.
    harness.dispatcher.send(|| ()).unwrap();

    assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_post_panic_is_logged() {
    let harness = Harness::new();
    harness.dispatcher.post(|| panic!("fire and forget"));
    harness.dispatcher.send(|| ()).unwrap();

    let failures = harness.sink.records_at(LogLevel::Exception);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("fire and forget"));
}

#[tokio::test]
async fn test_parameterized_and_async_variants() {
    let harness = Harness::new();

    let sum = harness
        .dispatcher
        .schedule_with(vec![1, 2, 3], |values: Vec<i32>| {
            Ok::<_, anyhow::Error>(values.iter().sum::<i32>())
        })
        .await
        .unwrap();
    assert_eq!(sum, 6);

    let async_value = harness
        .dispatcher
        .schedule_async(|| async {
            // Non-Send state held across an await point.
            let local = std::rc::Rc::new(21);
            tokio::task::yield_now().await;
            Ok::<_, anyhow::Error>(*local * 2)
        })
        .await
        .unwrap();
    assert_eq!(async_value, 42);

    let async_with = harness
        .dispatcher
        .schedule_async_with("banner".to_string(), |placement: String| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let thread = current_thread_name().unwrap_or_default();
            Ok::<_, anyhow::Error>(format!("{placement}@{thread}"))
        })
        .await
        .unwrap();
    assert_eq!(async_with, format!("banner@{MAIN}"));

    let async_failure = harness
        .dispatcher
        .schedule_async_with(3_u8, |attempt: u8| async move {
            tokio::task::yield_now().await;
            Err::<(), _>(anyhow::anyhow!("attempt {attempt} rejected"))
        })
        .await;
    assert!(matches!(
        async_failure,
        Err(DispatchError::Failed(ref e)) if e.to_string() == "attempt 3 rejected"
    ));
    assert_eq!(harness.sink.failure_count(), 1);
}

#[tokio::test]
async fn test_continuation_waits_for_antecedent_and_runs_on_main() {
    let harness = Harness::new();
    let main_id = harness.main_thread_id();
    let antecedent_done = Arc::new(AtomicBool::new(false));

    // Antecedent completes on an unrelated thread.
    let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
    let antecedent = {
        let antecedent_done = antecedent_done.clone();
        async move {
            let value = rx.await.unwrap_or_default();
            antecedent_done.store(true, Ordering::SeqCst);
            value
        }
    };

    let observed_done = antecedent_done.clone();
    let continuation = harness.dispatcher.continue_on_main(antecedent, move |value| {
        Ok::<_, anyhow::Error>((
            value,
            observed_done.load(Ordering::SeqCst),
            std::thread::current().id(),
        ))
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!continuation.is_finished());

    std::thread::spawn(move || tx.send(99).unwrap())
        .join()
        .unwrap();

    let (value, saw_done, ran_on) = continuation.await.unwrap();
    assert_eq!(value, 99);
    assert!(saw_done);
    assert_eq!(ran_on, main_id);
}

#[tokio::test]
async fn test_continuation_receives_failed_antecedent() {
    let harness = Harness::new();

    let failing = harness
        .dispatcher
        .schedule(|| -> anyhow::Result<u32> { anyhow::bail!("ad request timed out") });

    let continuation = harness.dispatcher.continue_on_main(failing, |outcome| {
        Ok::<_, anyhow::Error>(matches!(outcome, Err(DispatchError::Failed(_))))
    });

    assert!(continuation.await.unwrap());
    // Only the antecedent failed; the continuation itself succeeded.
    assert_eq!(harness.sink.failure_count(), 1);
}

#[tokio::test]
async fn test_failing_continuation_is_logged() {
    let harness = Harness::new();
    let antecedent = harness.dispatcher.schedule(|| Ok::<_, anyhow::Error>(5_u8));

    let outcome = harness
        .dispatcher
        .continue_on_main(antecedent, |_| -> anyhow::Result<()> {
            anyhow::bail!("continuation failed")
        })
        .await;

    assert!(matches!(outcome, Err(DispatchError::Failed(_))));
    let failures = harness.sink.records_at(LogLevel::Exception);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.starts_with("continue_on_main"));
}

#[test]
fn test_tasks_from_many_threads_all_run_on_main() {
    let harness = Harness::new();
    let main_id = harness.main_thread_id();
    let on_main = Arc::new(AtomicUsize::new(0));

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = harness.dispatcher.clone();
            let on_main = on_main.clone();
            std::thread::spawn(move || {
                let tasks: Vec<_> = (0..25)
                    .map(|_| {
                        let on_main = on_main.clone();
                        dispatcher.schedule_action(move || {
                            if std::thread::current().id() == main_id {
                                on_main.fetch_add(1, Ordering::SeqCst);
                            }
                        })
                    })
                    .collect();
                for task in tasks {
                    task.wait().unwrap();
                }
            })
        })
        .collect();

    for caller in callers {
        caller.join().unwrap();
    }
    assert_eq!(on_main.load(Ordering::SeqCst), 100);
}

#[test]
fn test_work_after_shutdown_fails_with_context_closed() {
    let harness = Harness::new();
    harness.context.shutdown();

    let task = harness.dispatcher.schedule(|| Ok::<_, anyhow::Error>(1));
    assert_eq!(task.state(), TaskState::Failed);
    assert!(matches!(task.wait(), Err(DispatchError::ContextClosed)));
    assert!(matches!(
        harness.dispatcher.send(|| ()),
        Err(DispatchError::ContextClosed)
    ));
    assert_eq!(harness.sink.failure_count(), 2);
}

#[test]
fn test_work_queued_before_shutdown_still_completes() {
    let harness = Harness::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let action = {
        let counter = counter.clone();
        harness.dispatcher.schedule_action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };
    let delayed = harness.dispatcher.schedule_async(|| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, anyhow::Error>("flushed")
    });
    {
        let counter = counter.clone();
        harness.dispatcher.post(move || {
            counter.fetch_add(100, Ordering::SeqCst);
        });
    }

    harness.context.shutdown();

    assert!(action.wait().is_ok());
    assert_eq!(delayed.wait().unwrap(), "flushed");
    assert_eq!(counter.load(Ordering::SeqCst), 101);
    assert_eq!(harness.sink.failure_count(), 0);
}

fn explode(message: &str) -> anyhow::Result<u8> {
    panic!("{message}")
}

fn assert_failed_once(harness: &Harness, outcome: Result<u8, DispatchError>, message: &str) {
    match outcome {
        Err(DispatchError::Failed(error)) => assert_eq!(error.to_string(), message),
        other => panic!("expected Failed({message}), got {other:?}"),
    }
    let failures = harness.sink.records_at(LogLevel::Exception);
    assert_eq!(failures.len(), 1, "{message}");
    assert!(failures[0].message.contains(message));
    harness.sink.clear();
}

fn assert_panicked_once(harness: &Harness, outcome: Result<u8, DispatchError>, message: &str) {
    match outcome {
        Err(DispatchError::Panicked(panic)) => assert_eq!(panic, message),
        other => panic!("expected Panicked({message}), got {other:?}"),
    }
    assert_eq!(harness.sink.failure_count(), 1, "{message}");
    harness.sink.clear();
}

#[tokio::test]
async fn test_every_variant_reports_failures_once() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher.clone();

    let outcome = dispatcher
        .schedule(|| -> anyhow::Result<u8> { anyhow::bail!("schedule failed") })
        .await;
    assert_failed_once(&harness, outcome, "schedule failed");

    let outcome = dispatcher
        .schedule_with(2_u8, |level: u8| -> anyhow::Result<u8> {
            anyhow::bail!("level {level} missing")
        })
        .await;
    assert_failed_once(&harness, outcome, "level 2 missing");

    let outcome = dispatcher
        .schedule_async(|| async {
            tokio::task::yield_now().await;
            Err::<u8, _>(anyhow::anyhow!("async load failed"))
        })
        .await;
    assert_failed_once(&harness, outcome, "async load failed");

    let outcome = dispatcher
        .schedule_async_with("atlas", |asset: &'static str| async move {
            tokio::task::yield_now().await;
            Err::<u8, _>(anyhow::anyhow!("{asset} not found"))
        })
        .await;
    assert_failed_once(&harness, outcome, "atlas not found");

    let antecedent = dispatcher.schedule(|| Ok::<_, anyhow::Error>(1_u8));
    let outcome = dispatcher
        .continue_on_main(antecedent, |_| -> anyhow::Result<u8> {
            anyhow::bail!("follow-up failed")
        })
        .await;
    assert_failed_once(&harness, outcome, "follow-up failed");
}

#[tokio::test]
async fn test_every_variant_reports_panics_once() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher.clone();

    let outcome = dispatcher.schedule(|| explode("schedule panicked")).await;
    assert_panicked_once(&harness, outcome, "schedule panicked");

    let outcome = dispatcher
        .schedule_with("schedule_with panicked", |message: &'static str| {
            explode(message)
        })
        .await;
    assert_panicked_once(&harness, outcome, "schedule_with panicked");

    // Panics raised after a suspension point are caught as well.
    let outcome = dispatcher
        .schedule_async(|| async {
            tokio::task::yield_now().await;
            explode("async body panicked")
        })
        .await;
    assert_panicked_once(&harness, outcome, "async body panicked");

    let outcome = dispatcher
        .schedule_async_with("async_with panicked", |message: &'static str| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            explode(message)
        })
        .await;
    assert_panicked_once(&harness, outcome, "async_with panicked");

    let antecedent = dispatcher.schedule(|| Ok::<_, anyhow::Error>(1_u8));
    let outcome = dispatcher
        .continue_on_main(antecedent, |_| explode("continuation panicked"))
        .await;
    assert_panicked_once(&harness, outcome, "continuation panicked");

    // The main context keeps serving work after every panic.
    assert_eq!(dispatcher.send(|| 3).unwrap(), 3);
    assert_eq!(harness.sink.failure_count(), 0);
}
