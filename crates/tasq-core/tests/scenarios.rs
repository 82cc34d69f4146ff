//! End-to-end scenarios: Client + Launcher over the in-memory store.
//!
//! Scores come from a `FixedClock`, so "time passing" for scheduled and
//! retried tasks is driven by `clock.advance`. Loop intervals are real but short.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use tasq_core::app::{Inspector, Poller};
use tasq_core::domain::TaskState;
use tasq_core::impls::InMemoryStore;
use tasq_core::ports::{Clock, FixedClock, OrderedStore, to_score};
use tasq_core::queue::Keys;
use tasq_core::{Client, Config, HandlerError, Launcher, Task, TaskMessage, handler_fn};

const START: i64 = 1_700_000_000;

struct World {
    store: Arc<InMemoryStore>,
    clock: Arc<FixedClock>,
    client: Client,
    keys: Keys,
}

fn world() -> World {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(Utc.timestamp_opt(START, 0).unwrap()));
    let client = Client::new(store.clone()).with_clock(clock.clone());
    World {
        store,
        clock,
        client,
        keys: Keys::default(),
    }
}

fn fast_config(pool_size: usize) -> Config {
    Config {
        pool_size,
        poll_interval_ms: 10,
        dequeue_timeout_ms: 10,
        ..Config::default()
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn email_task(to: &str) -> Task {
    Task::from_value("send_email", json!({ "email": to, "subject": "hi" })).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_task_runs_once_with_its_payload() {
    let w = world();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let mut launcher = Launcher::builder(w.store.clone())
        .config(fast_config(2))
        .clock(w.clock.clone())
        .handle(
            "default",
            handler_fn(move |task: Task| {
                let sink = sink.clone();
                async move {
                    let email = task.get_str("email").unwrap_or_default().to_string();
                    sink.lock().unwrap().push((task.task_type().to_string(), email));
                    Ok(())
                }
            }),
        )
        .unwrap()
        .build()
        .unwrap();
    launcher.start().unwrap();

    w.client
        .enqueue("default", email_task("a@b.com"), Duration::ZERO)
        .await
        .unwrap();

    wait_until("handler call", || !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    launcher.terminate().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("send_email".to_string(), "a@b.com".to_string())]
    );
    assert_eq!(w.store.list_len(&w.keys.queue("default")).await.unwrap(), 0);
    assert_eq!(w.store.set_len(w.keys.retry()).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_task_waits_for_its_due_time() {
    let w = world();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut launcher = Launcher::builder(w.store.clone())
        .config(fast_config(2))
        .clock(w.clock.clone())
        .handle(
            "default",
            handler_fn(move |_task: Task| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap()
        .build()
        .unwrap();
    launcher.start().unwrap();

    let report = Task::from_value("generate_report", json!({ "type": "daily" })).unwrap();
    w.client
        .enqueue("default", report, Duration::from_secs(5))
        .await
        .unwrap();

    // Many poll iterations, none of them due yet.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(w.store.set_len(w.keys.scheduled()).await.unwrap(), 1);

    w.clock.advance(Duration::from_secs(5));
    wait_until("delayed task", || calls.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    launcher.terminate().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(w.store.set_len(w.keys.scheduled()).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pollers_never_promote_twice() {
    let w = world();
    for i in 0..200 {
        w.client
            .enqueue("default", email_task(&format!("u{i}@b.com")), Duration::from_secs(1))
            .await
            .unwrap();
    }
    w.clock.advance(Duration::from_secs(2));

    let clock: Arc<dyn Clock> = w.clock.clone();
    let a = Poller::new(w.store.clone(), w.keys.clone(), clock.clone(), Duration::from_millis(10));
    let b = Poller::new(w.store.clone(), w.keys.clone(), clock, Duration::from_millis(10));
    let (from_a, from_b) = tokio::join!(a.poll_once(), b.poll_once());

    assert_eq!(from_a + from_b, 200);
    assert_eq!(w.store.list_len(&w.keys.queue("default")).await.unwrap(), 200);
    assert_eq!(w.store.set_len(w.keys.scheduled()).await.unwrap(), 0);

    let mut ids: Vec<_> = w
        .store
        .list_range(&w.keys.queue("default"))
        .await
        .unwrap()
        .iter()
        .map(|data| TaskMessage::decode(data).unwrap().id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_task_is_dead_after_its_retry_limit() {
    let w = world();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut launcher = Launcher::builder(w.store.clone())
        .config(fast_config(2))
        .clock(w.clock.clone())
        .handle(
            "default",
            handler_fn(move |_task: Task| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::from("smtp unreachable"))
                }
            }),
        )
        .unwrap()
        .build()
        .unwrap();
    launcher.start().unwrap();

    let id = w
        .client
        .enqueue_with_retry("default", email_task("a@b.com"), Duration::ZERO, 3)
        .await
        .unwrap();

    let mut due_times = Vec::new();
    let mut counts = Vec::new();
    for cycle in 1..=2 {
        wait_until("failed attempt", || attempts.load(Ordering::SeqCst) == cycle).await;
        let store = w.store.clone();
        let retry_key = w.keys.retry().to_string();
        let mut entries = Vec::new();
        for _ in 0..200 {
            entries = store.set_entries(&retry_key).await.unwrap();
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(entries.len(), 1, "cycle {cycle}");
        let (data, score) = &entries[0];
        let message = TaskMessage::decode(data).unwrap();
        assert_eq!(message.id, id);
        assert_eq!(message.last_error, "smtp unreachable");
        assert!(score > &to_score(w.clock.now()));
        counts.push(message.retry_count);
        due_times.push(*score);

        // Jump past the backoff so the poller picks it up.
        w.clock.advance(Duration::from_secs(3600));
    }

    wait_until("third attempt", || attempts.load(Ordering::SeqCst) == 3).await;
    let inspector = Inspector::new(w.store.clone(), w.keys.clone());
    let mut dead = Vec::new();
    for _ in 0..200 {
        dead = inspector.dead().await.unwrap();
        if !dead.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    launcher.terminate().await.unwrap();

    assert_eq!(counts, vec![1, 2]);
    assert!(due_times[0] < due_times[1]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message.retry_count, 3);
    assert_eq!(dead[0].message.last_error, "smtp unreachable");
    assert_eq!(w.store.set_len(w.keys.retry()).await.unwrap(), 0);
    assert_eq!(
        inspector.locate(&["default"], &id).await.unwrap(),
        vec![TaskState::Dead]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_pool_size() {
    let w = world();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let (r, p, d) = (running.clone(), peak.clone(), done.clone());

    let mut launcher = Launcher::builder(w.store.clone())
        .config(fast_config(3))
        .clock(w.clock.clone())
        .handle(
            "default",
            handler_fn(move |_task: Task| {
                let (r, p, d) = (r.clone(), p.clone(), d.clone());
                async move {
                    let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    r.fetch_sub(1, Ordering::SeqCst);
                    d.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap()
        .build()
        .unwrap();

    for i in 0..12 {
        w.client
            .enqueue("default", email_task(&format!("u{i}@b.com")), Duration::ZERO)
            .await
            .unwrap();
    }
    launcher.start().unwrap();

    wait_until("all tasks", || done.load(Ordering::SeqCst) == 12).await;
    launcher.terminate().await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminate_waits_for_in_flight_and_leaves_the_rest_queued() {
    let w = world();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (s, f) = (started.clone(), finished.clone());

    let mut launcher = Launcher::builder(w.store.clone())
        .config(fast_config(2))
        .clock(w.clock.clone())
        .handle(
            "default",
            handler_fn(move |_task: Task| {
                let (s, f) = (s.clone(), f.clone());
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap()
        .build()
        .unwrap();
    launcher.start().unwrap();

    for i in 0..2 {
        w.client
            .enqueue("default", email_task(&format!("u{i}@b.com")), Duration::ZERO)
            .await
            .unwrap();
    }
    wait_until("both slots busy", || started.load(Ordering::SeqCst) == 2).await;
    assert_eq!(launcher.in_flight(), 2);

    let extra = w
        .client
        .enqueue("default", email_task("late@b.com"), Duration::ZERO)
        .await
        .unwrap();
    // Let the dispatcher pick it up and block on the full pool.
    tokio::time::sleep(Duration::from_millis(30)).await;

    launcher.terminate().await.unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(started.load(Ordering::SeqCst), 2);
    let left = w.store.list_range(&w.keys.queue("default")).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(TaskMessage::decode(&left[0]).unwrap().id, extra);
}
