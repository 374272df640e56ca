//! Connection: the shared hub owning the store handles, the key namespace,
//! the notification bus, and the enqueue / result-RPC surface.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use resq_redis::{PubSub, RedisConfig, RedisService};

use crate::error::{QueueError, QueueResult};
use crate::events::{Notification, NotificationBus};
use crate::ids::IdAllocator;
use crate::job::{JobId, JobPayload};
use crate::keyspace::{DEFAULT_NAMESPACE, KeySpace};
use crate::worker::{HandlerTable, QueueSpec, Worker};

/// Default poll-empty backoff.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Backing store configuration (host, port, database, auth).
    pub redis: RedisConfig,

    /// Namespace prefix for every key this connection touches.
    pub namespace: String,

    /// Backoff duration a worker pauses for when a queue comes up empty.
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration over the given store settings.
    pub fn new(redis: RedisConfig) -> Self {
        Self {
            redis,
            ..Default::default()
        }
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the poll-empty backoff.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A one-shot result watch: resolves with the result values once the worker
/// publishes them, after which the value key has been deleted and the
/// underlying subscription torn down.
pub struct ResultWatch {
    receiver: oneshot::Receiver<Vec<Value>>,
    key: String,
}

impl ResultWatch {
    /// The watched key (also the pub/sub channel name).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the result values.
    pub async fn recv(self) -> QueueResult<Vec<Value>> {
        self.receiver
            .await
            .map_err(|_| QueueError::Other(format!("result watch for {} closed", self.key)))
    }
}

/// Store a serialized value and announce it on the channel of the same name.
///
/// This set-then-publish pair is the sole cross-process RPC mechanism.
pub(crate) async fn set_key<T: Serialize>(
    redis: &RedisService,
    key: &str,
    value: &T,
) -> QueueResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| QueueError::Serialization(e.to_string()))?;
    redis.set_value(key, raw).await?;
    redis.publish(key, "changed").await?;
    Ok(())
}

/// Owns the command and subscription handles and acts as the shared event
/// hub for every worker created from it.
pub struct Connection {
    redis: Arc<RedisService>,
    pubsub: Arc<PubSub>,
    keys: KeySpace,
    timeout: Duration,
    jobs: HandlerTable,
    bus: NotificationBus,
    ids: IdAllocator,
}

impl Connection {
    /// Connect with an empty default handler table.
    pub async fn connect(config: ConnectionConfig) -> QueueResult<Self> {
        Self::connect_with_jobs(config, HandlerTable::new()).await
    }

    /// Connect with a default handler table for workers created without an
    /// explicit one.
    pub async fn connect_with_jobs(
        config: ConnectionConfig,
        jobs: HandlerTable,
    ) -> QueueResult<Self> {
        let redis = Arc::new(RedisService::new(config.redis.clone()).await?);
        let pubsub = Arc::new(redis.pubsub()?);
        Ok(Self::from_handles(config, redis, pubsub, jobs))
    }

    /// Build a connection over pre-built store handles.
    pub fn from_handles(
        config: ConnectionConfig,
        redis: Arc<RedisService>,
        pubsub: Arc<PubSub>,
        jobs: HandlerTable,
    ) -> Self {
        info!(namespace = %config.namespace, "Queue connection ready");
        Self {
            ids: IdAllocator::new(redis.clone()),
            redis,
            pubsub,
            keys: KeySpace::new(config.namespace),
            timeout: config.timeout,
            jobs,
            bus: NotificationBus::new(),
        }
    }

    /// The configured namespace.
    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }

    /// The key space this connection writes under.
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// The shared command handle.
    pub fn redis(&self) -> &Arc<RedisService> {
        &self.redis
    }

    /// Subscribe to lifecycle notifications from every worker sharing this
    /// connection.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// Enqueue a job, fire-and-forget.
    ///
    /// Allocates an id, records the queue in the known-queues set, and
    /// pushes the serialized payload onto the queue's FIFO list.
    pub async fn enqueue(
        &self,
        queue: &str,
        class: impl Into<String>,
        args: Vec<Value>,
    ) -> QueueResult<JobId> {
        let id = self.ids.allocate().await?;
        self.push(queue, JobPayload::new(class, args, id)).await?;
        Ok(id)
    }

    /// Enqueue a job and watch for its result.
    ///
    /// The result watch is armed (subscription confirmed) before the job is
    /// pushed, so the result cannot arrive ahead of the watch.
    pub async fn enqueue_for_result(
        &self,
        queue: &str,
        class: impl Into<String>,
        args: Vec<Value>,
    ) -> QueueResult<(JobId, ResultWatch)> {
        let id = self.ids.allocate().await?;
        let watch = self.watch_key(&self.keys.result(id)).await?;
        self.push(queue, JobPayload::new(class, args, id)).await?;
        Ok((id, watch))
    }

    async fn push(&self, queue: &str, payload: JobPayload) -> QueueResult<()> {
        let raw = serde_json::to_string(&payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        self.redis.sadd(&self.keys.queues(), queue).await?;
        self.redis.rpush(&self.keys.queue(queue), raw).await?;

        debug!(queue = %queue, class = %payload.class, id = payload.id, "Enqueued job");
        Ok(())
    }

    /// Watch a key for a one-shot result notification.
    ///
    /// On the first "changed" notification for exactly this channel, the
    /// value is read back, deleted, and delivered; a JSON array is expanded
    /// positionally, any other value arrives as a single element. The
    /// subscription is torn down after the first match so a reused key can
    /// never double-fire a stale watch.
    pub async fn watch_key(&self, key: &str) -> QueueResult<ResultWatch> {
        let mut subscription = self.pubsub.subscribe(key).await?;
        let (tx, rx) = oneshot::channel();

        let redis = self.redis.clone();
        let watched = key.to_string();

        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                if message.channel != watched {
                    continue;
                }

                let raw: Option<String> = match redis.get_value(&watched).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(key = %watched, error = %e, "Failed to read watched value");
                        break;
                    }
                };

                if let Err(e) = redis.delete(&watched).await {
                    warn!(key = %watched, error = %e, "Failed to delete watched value");
                }

                let values = match raw.as_deref().map(serde_json::from_str::<Value>) {
                    Some(Ok(Value::Array(items))) => items,
                    Some(Ok(other)) => vec![other],
                    Some(Err(e)) => {
                        warn!(key = %watched, error = %e, "Watched value was not valid JSON");
                        break;
                    }
                    None => Vec::new(),
                };

                let _ = tx.send(values);
                break;
            }
            // Dropping the subscription here unsubscribes.
        });

        Ok(ResultWatch {
            receiver: rx,
            key: key.to_string(),
        })
    }

    /// Serialize a value under `key` and publish a "changed" notification on
    /// the channel of the same name.
    pub async fn set_key<T: Serialize>(&self, key: &str, value: &T) -> QueueResult<()> {
        set_key(&self.redis, key, value).await
    }

    /// Create a worker over this connection's default handler table.
    pub fn worker(&self, queues: impl Into<QueueSpec>) -> Worker {
        self.worker_with_jobs(queues, self.jobs.clone())
    }

    /// Create a worker with an explicit handler table.
    pub fn worker_with_jobs(&self, queues: impl Into<QueueSpec>, jobs: HandlerTable) -> Worker {
        let base = std::env::var("HOSTNAME").unwrap_or_else(|_| "resq".to_string());
        self.named_worker(base, queues, jobs)
    }

    /// Create a worker with an explicit base name and handler table.
    pub fn named_worker(
        &self,
        base_name: impl Into<String>,
        queues: impl Into<QueueSpec>,
        jobs: HandlerTable,
    ) -> Worker {
        Worker::new(
            self.redis.clone(),
            self.keys.clone(),
            self.bus.clone(),
            self.timeout,
            base_name.into(),
            queues.into(),
            jobs,
        )
    }

    /// Release the command and subscription handles.
    ///
    /// Nothing pending is awaited: workers or watches still holding clones
    /// of the handles keep them alive until they observe their own stop
    /// conditions, and in-flight operations may fail after this call.
    pub fn end(self) {
        info!(namespace = %self.keys.namespace(), "Queue connection closed");
        drop(self);
    }
}
