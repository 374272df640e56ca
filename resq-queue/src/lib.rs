//! Redis-backed job queue with pub/sub result delivery.
//!
//! Producers enqueue named jobs with positional arguments; workers pull jobs
//! from named queues, execute a locally registered handler, and publish
//! results back to any caller waiting on them. No dedicated broker process:
//! the shared store's atomic list pop is the only mutual exclusion.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resq_queue::{Connection, ConnectionConfig, HandlerTable, handler};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resq_queue::QueueError> {
//!     let mut jobs = HandlerTable::new();
//!     jobs.insert(
//!         "add".to_string(),
//!         handler(|args| async move {
//!             let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
//!             Ok(vec![json!(sum)])
//!         }),
//!     );
//!
//!     let conn = Connection::connect_with_jobs(ConnectionConfig::default(), jobs).await?;
//!
//!     // Fire-and-forget
//!     conn.enqueue("math", "add", vec![json!(1), json!(2)]).await?;
//!
//!     // Wait for a result
//!     let (_id, watch) = conn
//!         .enqueue_for_result("math", "add", vec![json!(20), json!(22)])
//!         .await?;
//!
//!     let mut worker = conn.worker("math");
//!     worker.start().await?;
//!
//!     let result = watch.recv().await?;
//!     assert_eq!(result, vec![json!(42)]);
//!
//!     worker.end().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Watching every queue
//!
//! ```rust,ignore
//! // "*" resolves against the known-queues set, sorted lexicographically
//! let mut worker = conn.worker("*");
//! worker.start().await?;
//! ```
//!
//! ## Observing lifecycle events
//!
//! ```rust,ignore
//! use resq_queue::Notification;
//!
//! let mut events = conn.notifications();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         Notification::Success { worker, queue, job } => {
//!             println!("{} finished {} on {}", worker, job.class, queue);
//!         }
//!         Notification::Error { error, .. } => eprintln!("{}", error),
//!         _ => {}
//!     }
//! }
//! ```

pub mod connection;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod keyspace;
pub mod worker;

pub use connection::{Connection, ConnectionConfig, DEFAULT_TIMEOUT, ResultWatch};
pub use error::{QueueError, QueueResult};
pub use events::{Notification, NotificationBus};
pub use ids::{ID_SPACE, IdAllocator, MAX_PROBE_ATTEMPTS};
pub use job::{FailurePayload, JobId, JobPayload};
pub use keyspace::{DEFAULT_NAMESPACE, KeySpace};
pub use worker::{HandlerTable, JobHandler, QueueSpec, Worker, WorkerName, handler};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::connection::{Connection, ConnectionConfig, ResultWatch};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::events::Notification;
    pub use crate::job::{JobId, JobPayload};
    pub use crate::worker::{HandlerTable, QueueSpec, Worker, handler};
}
