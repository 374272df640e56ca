//! Integration tests for resq-queue

use resq_queue::*;
use resq_redis::RedisConfig;
use serde_json::json;
use std::time::Duration;

#[test]
fn test_connection_config_defaults() {
    let config = ConnectionConfig::default();
    assert_eq!(config.namespace, "resque");
    assert_eq!(config.timeout, Duration::from_millis(5000));
}

#[test]
fn test_connection_config_builder() {
    let config = ConnectionConfig::new(RedisConfig::new("redis://localhost:6379"))
        .with_namespace("app")
        .with_timeout(Duration::from_millis(200));

    assert_eq!(config.namespace, "app");
    assert_eq!(config.timeout, Duration::from_millis(200));
}

#[test]
fn test_job_payload_wire_format() {
    let payload = JobPayload::new("send_email", vec![json!("a@example.com"), json!(7)], 12);
    let wire = serde_json::to_value(&payload).unwrap();

    assert_eq!(
        wire,
        json!({"class": "send_email", "args": ["a@example.com", 7], "id": 12})
    );
}

#[test]
fn test_queue_spec_forms() {
    assert_eq!(QueueSpec::from("*"), QueueSpec::All);
    assert_eq!(
        QueueSpec::from("high,low"),
        QueueSpec::Named(vec!["high".to_string(), "low".to_string()])
    );
}

#[test]
fn test_key_layout() {
    let keys = KeySpace::new("app");
    assert_eq!(keys.queue("emails"), "app:queue:emails");
    assert_eq!(keys.failed(), "app:failed");
}

// The tests below require a running Redis. Run them with:
// cargo test -- --ignored

async fn connect(namespace: &str) -> Connection {
    let config = ConnectionConfig::new(RedisConfig::new("redis://localhost:6379"))
        .with_namespace(namespace)
        .with_timeout(Duration::from_millis(200));
    Connection::connect(config).await.unwrap()
}

fn noop_jobs() -> HandlerTable {
    let mut jobs = HandlerTable::new();
    jobs.insert("noop".to_string(), handler(|_args| async move { Ok(vec![]) }));
    jobs
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_preserves_args() {
    let conn = connect("resq_test_args").await;
    let args = vec![json!("first"), json!(2), json!(null), json!({"k": "v"})];

    conn.enqueue("wire", "check", args.clone()).await.unwrap();

    let raw: Option<String> = conn.redis().lpop(&conn.keys().queue("wire")).await.unwrap();
    let payload: JobPayload = serde_json::from_str(&raw.unwrap()).unwrap();

    assert_eq!(payload.class, "check");
    assert_eq!(payload.args, args);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_round_robin_polling() {
    let conn = connect("resq_test_rr").await;

    for queue in ["a", "b", "c"] {
        conn.enqueue(queue, "noop", vec![]).await.unwrap();
    }

    let mut events = conn.notifications();
    let mut worker = conn.named_worker("w1", "a,b,c", noop_jobs());
    worker.start().await.unwrap();

    let mut polled = Vec::new();
    while polled.len() < 3 {
        match events.recv().await.unwrap() {
            Notification::Poll { queue, .. } => polled.push(queue),
            _ => {}
        }
    }

    assert_eq!(polled, vec!["a", "b", "c"]);
    worker.end().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_result_delivery_and_cleanup() {
    let conn = connect("resq_test_result").await;

    let mut jobs = HandlerTable::new();
    jobs.insert(
        "answer".to_string(),
        handler(|_args| async move { Ok(vec![json!(42)]) }),
    );

    let (id, watch) = conn
        .enqueue_for_result("math", "answer", vec![])
        .await
        .unwrap();

    let mut worker = conn.named_worker("w1", "math", jobs);
    worker.start().await.unwrap();

    let result = watch.recv().await.unwrap();
    assert_eq!(result, vec![json!(42)]);

    // Value key is deleted after being read
    assert!(!conn.redis().exists(&conn.keys().result(id)).await.unwrap());

    worker.end().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_missing_handler_counts_failure() {
    let conn = connect("resq_test_fail").await;
    let keys = conn.keys().clone();

    // Reset counters from earlier runs
    conn.redis()
        .delete_all(&[keys.stat_failed(), keys.failed()])
        .await
        .unwrap();

    conn.enqueue("oops", "nonexistent", vec![]).await.unwrap();

    let mut events = conn.notifications();
    let mut worker = conn.named_worker("w1", "oops", HandlerTable::new());
    worker.start().await.unwrap();
    let worker_name = worker.display_name().unwrap().to_string();

    loop {
        if let Notification::Error { job: Some(job), .. } = events.recv().await.unwrap() {
            assert_eq!(job.class, "nonexistent");
            break;
        }
    }

    let global: Option<i64> = conn.redis().get_value(&keys.stat_failed()).await.unwrap();
    let per_worker: Option<i64> = conn
        .redis()
        .get_value(&keys.stat_failed_for(&worker_name))
        .await
        .unwrap();
    assert_eq!(global, Some(1));
    assert_eq!(per_worker, Some(1));

    let failures: Vec<String> = conn.redis().lrange(&keys.failed(), 0, -1).await.unwrap();
    assert_eq!(failures.len(), 1);
    let failure: FailurePayload = serde_json::from_str(&failures[0]).unwrap();
    assert_eq!(failure.payload["class"], json!("nonexistent"));

    worker.end().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_handler_panic_fails_job_and_worker_survives() {
    let conn = connect("resq_test_panic").await;
    let keys = conn.keys().clone();

    // Reset counters from earlier runs
    conn.redis()
        .delete_all(&[keys.stat_failed(), keys.failed()])
        .await
        .unwrap();

    let mut jobs = noop_jobs();
    jobs.insert(
        "explode".to_string(),
        handler(|_args| async move { panic!("boom") }),
    );

    conn.enqueue("q", "explode", vec![]).await.unwrap();
    conn.enqueue("q", "noop", vec![]).await.unwrap();

    let mut events = conn.notifications();
    let mut worker = conn.named_worker("w1", "q", jobs);
    worker.start().await.unwrap();

    // The panicking job fails, and the loop survives to run the next job.
    let (mut saw_error, mut saw_success) = (false, false);
    while !(saw_error && saw_success) {
        match events.recv().await.unwrap() {
            Notification::Error { job: Some(job), error, .. } => {
                assert_eq!(job.class, "explode");
                assert!(error.contains("panicked"), "unexpected error: {}", error);
                saw_error = true;
            }
            Notification::Success { job, .. } => {
                assert_eq!(job.class, "noop");
                saw_success = true;
            }
            _ => {}
        }
    }
    assert!(worker.is_running());

    let global: Option<i64> = conn.redis().get_value(&keys.stat_failed()).await.unwrap();
    assert_eq!(global, Some(1));

    worker.end().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_end_waits_for_in_flight_job() {
    let conn = connect("resq_test_inflight").await;
    let keys = conn.keys().clone();

    conn.redis().delete(&keys.stat_processed()).await.unwrap();

    let mut jobs = HandlerTable::new();
    jobs.insert(
        "slow".to_string(),
        handler(|_args| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(vec![])
        }),
    );

    conn.enqueue("q", "slow", vec![]).await.unwrap();

    let mut worker = conn.named_worker("w1", "q", jobs);
    worker.start().await.unwrap();
    let worker_name = worker.display_name().unwrap().to_string();

    // Stop the worker while the job is mid-handler.
    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.end().await.unwrap();

    // The in-flight job ran to completion and its global stat landed,
    let global: Option<i64> = conn
        .redis()
        .get_value(&keys.stat_processed())
        .await
        .unwrap();
    assert_eq!(global, Some(1));

    // while the per-worker stat was written before end() deleted it, so the
    // key stays gone.
    assert!(
        !conn
            .redis()
            .exists(&keys.stat_processed_for(&worker_name))
            .await
            .unwrap()
    );
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_pause_and_resume_on_empty_queue() {
    let conn = connect("resq_test_pause").await;
    let keys = conn.keys().clone();

    let mut events = conn.notifications();
    let mut worker = conn.named_worker("w1", "empty", noop_jobs());
    worker.start().await.unwrap();
    let worker_name = worker.display_name().unwrap().to_string();

    // First poll comes straight away
    let first = tokio::time::Instant::now();
    loop {
        if matches!(events.recv().await.unwrap(), Notification::Poll { .. }) {
            break;
        }
    }

    // During the pause the worker has left the active set
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !conn
            .redis()
            .sismember(&keys.workers(), worker_name.as_str())
            .await
            .unwrap()
    );

    // A new poll attempt arrives within roughly the 200ms backoff
    loop {
        if matches!(events.recv().await.unwrap(), Notification::Poll { .. }) {
            break;
        }
    }
    let elapsed = first.elapsed();
    assert!(elapsed >= Duration::from_millis(150), "resumed too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "resumed too late: {:?}", elapsed);

    worker.end().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_end_is_idempotent() {
    let conn = connect("resq_test_end").await;
    let keys = conn.keys().clone();

    let mut worker = conn.named_worker("w1", "q", noop_jobs());
    worker.start().await.unwrap();
    let worker_name = worker.display_name().unwrap().to_string();

    worker.end().await.unwrap();
    worker.end().await.unwrap();

    assert!(!worker.is_running());
    assert!(
        !conn
            .redis()
            .exists(&keys.worker_started(&worker_name))
            .await
            .unwrap()
    );
    assert!(
        !conn
            .redis()
            .exists(&keys.stat_processed_for(&worker_name))
            .await
            .unwrap()
    );
    assert!(
        !conn
            .redis()
            .sismember(&keys.workers(), worker_name.as_str())
            .await
            .unwrap()
    );
}
