//! Worker implementation: claims queues, polls them round-robin, executes
//! locally registered handlers, and records success/failure bookkeeping.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use resq_redis::RedisService;

use crate::connection::set_key;
use crate::error::{QueueError, QueueResult};
use crate::events::{Notification, NotificationBus};
use crate::job::{FailurePayload, JobPayload};
use crate::keyspace::KeySpace;

/// Job handler function type.
///
/// Handlers take the job's positional argument list and resolve to the
/// result values delivered back to any caller watching the job.
pub type JobHandler = Arc<
    dyn Fn(Vec<Value>) -> Pin<Box<dyn Future<Output = QueueResult<Vec<Value>>> + Send>>
        + Send
        + Sync,
>;

/// Mapping from job class name to handler.
pub type HandlerTable = HashMap<String, JobHandler>;

/// Wrap an async closure as a [`JobHandler`].
///
/// # Examples
///
/// ```
/// use resq_queue::{handler, HandlerTable};
///
/// let mut jobs = HandlerTable::new();
/// jobs.insert(
///     "add".to_string(),
///     handler(|args| async move {
///         let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
///         Ok(vec![serde_json::json!(sum)])
///     }),
/// );
/// ```
pub fn handler<F, Fut>(f: F) -> JobHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueueResult<Vec<Value>>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Which queues a worker claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSpec {
    /// Wildcard: every queue name currently in the known-queues set,
    /// sorted lexicographically at resolution time.
    All,
    /// An explicit ordered list.
    Named(Vec<String>),
}

impl QueueSpec {
    /// Parse a queue specification: `"*"` is the wildcard, anything else is
    /// a comma-separated list.
    pub fn parse(spec: &str) -> Self {
        if spec == "*" {
            Self::All
        } else {
            Self::Named(
                spec.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )
        }
    }
}

impl From<&str> for QueueSpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<String> for QueueSpec {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

impl From<Vec<String>> for QueueSpec {
    fn from(queues: Vec<String>) -> Self {
        Self::Named(queues)
    }
}

impl From<Vec<&str>> for QueueSpec {
    fn from(queues: Vec<&str>) -> Self {
        Self::Named(queues.into_iter().map(String::from).collect())
    }
}

/// Worker display identity.
///
/// The display name embeds the resolved queue list, so it only exists once
/// resolution has happened; reading it earlier is an error rather than a
/// silent placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerName {
    /// Base name only; queues not yet resolved.
    Unresolved(String),
    /// Finalized `base:pid:queue,queue,...` form.
    Resolved(String),
}

impl WorkerName {
    /// The finalized display name.
    pub fn display(&self) -> QueueResult<&str> {
        match self {
            Self::Resolved(name) => Ok(name),
            Self::Unresolved(_) => Err(QueueError::UnresolvedWorker),
        }
    }
}

/// Round-robin queue selection: take the front, then rotate it to the back.
fn rotate(queues: &mut VecDeque<String>) -> Option<String> {
    let queue = queues.front().cloned()?;
    queues.rotate_left(1);
    Some(queue)
}

/// A worker bound to a connection's store handles and notification bus.
pub struct Worker {
    redis: Arc<RedisService>,
    keys: KeySpace,
    bus: NotificationBus,
    backoff: Duration,
    jobs: HandlerTable,
    spec: QueueSpec,
    queues: Vec<String>,
    name: WorkerName,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(
        redis: Arc<RedisService>,
        keys: KeySpace,
        bus: NotificationBus,
        backoff: Duration,
        base_name: String,
        spec: QueueSpec,
        jobs: HandlerTable,
    ) -> Self {
        Self {
            redis,
            keys,
            bus,
            backoff,
            jobs,
            spec,
            queues: Vec::new(),
            name: WorkerName::Unresolved(base_name),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// The worker's display name. Errors while the queue list is unresolved.
    pub fn display_name(&self) -> QueueResult<&str> {
        self.name.display()
    }

    /// The resolved queue rotation. Empty before resolution.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Whether the poll loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Normalize the queue specification and finalize the display identity.
    async fn resolve(&mut self) -> QueueResult<()> {
        let WorkerName::Unresolved(base) = &self.name else {
            return Ok(());
        };

        let queues = match &self.spec {
            QueueSpec::All => {
                let mut known: Vec<String> = self.redis.smembers(&self.keys.queues()).await?;
                known.sort();
                known
            }
            QueueSpec::Named(list) => list.clone(),
        };

        let display = format!("{}:{}:{}", base, std::process::id(), queues.join(","));
        self.queues = queues;
        self.name = WorkerName::Resolved(display);
        Ok(())
    }

    /// Start the worker: resolve queues, record the worker as active, and
    /// spawn the poll loop.
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        self.resolve().await?;
        let name = self.name.display()?.to_string();

        self.redis.sadd(&self.keys.workers(), name.as_str()).await?;
        self.redis
            .set_value(&self.keys.worker_started(&name), Utc::now().to_rfc3339())
            .await?;

        self.running.store(true, Ordering::SeqCst);
        info!(worker = %name, queues = ?self.queues, "Worker started");

        let run = RunLoop {
            redis: self.redis.clone(),
            keys: self.keys.clone(),
            bus: self.bus.clone(),
            backoff: self.backoff,
            jobs: self.jobs.clone(),
            queues: self.queues.iter().cloned().collect(),
            name,
            running: self.running.clone(),
            bookkeeping: JoinSet::new(),
        };
        self.handle = Some(tokio::spawn(run.run()));

        Ok(())
    }

    /// Stop the worker, wait for its loop to finish, and delete its
    /// per-worker keys.
    ///
    /// The running flag is observed cooperatively: an in-flight job finishes,
    /// a pending pause wakes and exits without re-registering. Global
    /// counters are left untouched. Calling `end` again is a no-op.
    pub async fn end(&mut self) -> QueueResult<()> {
        self.running.store(false, Ordering::SeqCst);

        // Wait for the loop to exit at its next decision point. The loop
        // drains its pending stat writes before returning, so nothing can
        // recreate the keys deleted below.
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }

        let name = match &self.name {
            WorkerName::Resolved(name) => name.clone(),
            // Never started: nothing was ever tracked.
            WorkerName::Unresolved(_) => return Ok(()),
        };

        self.redis.srem(&self.keys.workers(), name.as_str()).await?;
        self.redis
            .delete_all(&[
                self.keys.worker_started(&name),
                self.keys.stat_processed_for(&name),
                self.keys.stat_failed_for(&name),
            ])
            .await?;

        info!(worker = %name, "Worker ended");
        Ok(())
    }
}

/// State moved into the spawned poll loop task.
struct RunLoop {
    redis: Arc<RedisService>,
    keys: KeySpace,
    bus: NotificationBus,
    backoff: Duration,
    jobs: HandlerTable,
    queues: VecDeque<String>,
    name: String,
    running: Arc<AtomicBool>,
    /// Detached stat/failure writes, drained before the loop returns.
    bookkeeping: JoinSet<()>,
}

impl RunLoop {
    async fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            // Reap finished stat writes so the set stays small.
            while self.bookkeeping.try_join_next().is_some() {}

            let Some(queue) = rotate(&mut self.queues) else {
                self.pause().await;
                continue;
            };

            self.bus.emit(Notification::Poll {
                worker: self.name.clone(),
                queue: queue.clone(),
            });
            debug!(worker = %self.name, queue = %queue, "Polling");

            match self.redis.lpop::<String>(&self.keys.queue(&queue)).await {
                Ok(Some(raw)) => {
                    self.perform_raw(&queue, raw).await;
                    // Resume polling immediately; no gap between jobs.
                }
                Ok(None) => self.pause().await,
                Err(e) => {
                    self.bus.emit(Notification::Error {
                        worker: self.name.clone(),
                        queue: queue.clone(),
                        job: None,
                        error: e.to_string(),
                    });
                    self.pause().await;
                }
            }
        }

        // Let outstanding stat writes land before the task resolves, so
        // `Worker::end` can delete keys without a late write racing it.
        while self.bookkeeping.join_next().await.is_some() {}
        debug!(worker = %self.name, "Worker loop stopped");
    }

    async fn perform_raw(&mut self, queue: &str, raw: String) {
        match serde_json::from_str::<JobPayload>(&raw) {
            Ok(job) => self.perform(queue, job).await,
            Err(e) => {
                let err = QueueError::Deserialization(e.to_string());
                let failure = FailurePayload::from_raw(&self.name, &err, &raw);
                self.record_failure(queue, failure, None, err);
            }
        }
    }

    async fn perform(&mut self, queue: &str, job: JobPayload) {
        self.bus.emit(Notification::Job {
            worker: self.name.clone(),
            queue: queue.to_string(),
            job: job.clone(),
        });
        debug!(worker = %self.name, queue = %queue, class = %job.class, id = job.id, "Performing job");

        let Some(job_handler) = self.jobs.get(&job.class).cloned() else {
            let err = QueueError::MissingHandler(job.class.clone());
            self.fail(queue, &job, err);
            return;
        };

        // Run the handler in its own task so a panic becomes a failed job
        // instead of taking the poll loop down with it.
        let outcome = match tokio::spawn(job_handler(job.args.clone())).await {
            Ok(result) => result,
            Err(e) => Err(QueueError::ExecutionFailed(format!(
                "job handler panicked: {}",
                e
            ))),
        };

        match outcome {
            Ok(values) => match self.store_result(&job, values).await {
                Ok(()) => self.succeed(queue, job),
                Err(e) => self.fail(queue, &job, e),
            },
            Err(e) => self.fail(queue, &job, e),
        }
    }

    /// Publish the result under the job's result key so any watcher fires.
    async fn store_result(&self, job: &JobPayload, values: Vec<Value>) -> QueueResult<()> {
        let key = self.keys.result(job.id);
        set_key(&self.redis, &key, &Value::Array(values)).await
    }

    /// Record success bookkeeping without blocking the next poll. The
    /// success notification goes out after the counters land.
    fn succeed(&mut self, queue: &str, job: JobPayload) {
        let redis = self.redis.clone();
        let keys = [
            self.keys.stat_processed(),
            self.keys.stat_processed_for(&self.name),
        ];
        let bus = self.bus.clone();
        let worker = self.name.clone();
        let queue = queue.to_string();

        self.bookkeeping.spawn(async move {
            for key in keys {
                if let Err(e) = redis.incr(&key, 1).await {
                    warn!(worker = %worker, key = %key, error = %e, "Failed to record processed stat");
                }
            }
            bus.emit(Notification::Success { worker, queue, job });
        });
    }

    fn fail(&mut self, queue: &str, job: &JobPayload, err: QueueError) {
        let failure = FailurePayload::new(&self.name, &err, job);
        self.record_failure(queue, failure, Some(job.clone()), err);
    }

    /// Increment failed counters, append to the failed list, notify. Runs
    /// detached so the loop polls again right away; never fatal to the loop.
    fn record_failure(
        &mut self,
        queue: &str,
        failure: FailurePayload,
        job: Option<JobPayload>,
        err: QueueError,
    ) {
        let redis = self.redis.clone();
        let keys = [self.keys.stat_failed(), self.keys.stat_failed_for(&self.name)];
        let failed_list = self.keys.failed();
        let bus = self.bus.clone();
        let worker = self.name.clone();
        let queue = queue.to_string();

        self.bookkeeping.spawn(async move {
            for key in keys {
                if let Err(e) = redis.incr(&key, 1).await {
                    warn!(worker = %worker, key = %key, error = %e, "Failed to record failed stat");
                }
            }

            match serde_json::to_string(&failure) {
                Ok(raw) => {
                    if let Err(e) = redis.rpush(&failed_list, raw).await {
                        warn!(worker = %worker, error = %e, "Failed to append failure payload");
                    }
                }
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Failed to serialize failure payload");
                }
            }

            bus.emit(Notification::Error {
                worker,
                queue,
                job,
                error: err.to_string(),
            });
        });
    }

    /// Empty-queue backoff: leave the active set, sleep, and re-register
    /// only if still running when the timer fires.
    async fn pause(&self) {
        debug!(worker = %self.name, "No work found, pausing");

        if let Err(e) = self.redis.srem(&self.keys.workers(), self.name.as_str()).await {
            warn!(worker = %self.name, error = %e, "Failed to leave active set");
        }

        tokio::time::sleep(self.backoff).await;

        if self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.redis.sadd(&self.keys.workers(), self.name.as_str()).await {
                warn!(worker = %self.name, error = %e, "Failed to rejoin active set");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queue_spec_wildcard() {
        assert_eq!(QueueSpec::parse("*"), QueueSpec::All);
    }

    #[test]
    fn test_queue_spec_comma_list() {
        assert_eq!(
            QueueSpec::parse("high, low,default"),
            QueueSpec::Named(vec![
                "high".to_string(),
                "low".to_string(),
                "default".to_string()
            ])
        );
    }

    #[test]
    fn test_queue_spec_single_name() {
        assert_eq!(
            QueueSpec::from("emails"),
            QueueSpec::Named(vec!["emails".to_string()])
        );
    }

    #[test]
    fn test_queue_spec_from_vec() {
        assert_eq!(
            QueueSpec::from(vec!["a", "b"]),
            QueueSpec::Named(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_rotation_is_round_robin() {
        let mut queues =
            VecDeque::from(["a".to_string(), "b".to_string(), "c".to_string()]);

        let visited: Vec<String> = (0..3).filter_map(|_| rotate(&mut queues)).collect();

        assert_eq!(visited, vec!["a", "b", "c"]);
        assert_eq!(queues, ["a", "b", "c"]);
    }

    #[test]
    fn test_rotation_wraps_around() {
        let mut queues = VecDeque::from(["a".to_string(), "b".to_string()]);

        let visited: Vec<String> = (0..5).filter_map(|_| rotate(&mut queues)).collect();

        assert_eq!(visited, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn test_rotation_of_empty_list() {
        let mut queues: VecDeque<String> = VecDeque::new();
        assert_eq!(rotate(&mut queues), None);
    }

    #[test]
    fn test_unresolved_name_fails_loudly() {
        let name = WorkerName::Unresolved("base".to_string());
        assert!(matches!(
            name.display(),
            Err(QueueError::UnresolvedWorker)
        ));
    }

    #[test]
    fn test_resolved_name_displays() {
        let name = WorkerName::Resolved("base:42:high,low".to_string());
        assert_eq!(name.display().unwrap(), "base:42:high,low");
    }

    #[tokio::test]
    async fn test_handler_wrapper_invokes_with_args() {
        let add = handler(|args| async move {
            let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
            Ok(vec![json!(sum)])
        });

        let result = add(vec![json!(20), json!(22)]).await.unwrap();
        assert_eq!(result, vec![json!(42)]);
    }

    #[tokio::test]
    async fn test_handler_table_lookup() {
        let mut jobs = HandlerTable::new();
        jobs.insert("echo".to_string(), handler(|args| async move { Ok(args) }));

        assert!(jobs.contains_key("echo"));
        assert!(!jobs.contains_key("missing"));

        let echo = jobs.get("echo").unwrap();
        let result = echo(vec![json!("hello")]).await.unwrap();
        assert_eq!(result, vec![json!("hello")]);
    }

    #[tokio::test]
    async fn test_handler_errors_propagate() {
        let boom = handler(|_args| async move {
            Err::<Vec<Value>, _>(QueueError::ExecutionFailed("boom".to_string()))
        });

        let result: QueueResult<Vec<Value>> = boom(vec![]).await;
        assert!(matches!(result, Err(QueueError::ExecutionFailed(_))));
    }
}
