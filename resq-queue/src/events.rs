//! Lifecycle notification bus.
//!
//! The connection owns a single broadcast bus; every worker sharing the
//! connection publishes into it, so host applications observe a uniform
//! stream regardless of which worker produced an event. Workers keep no
//! listener storage of their own.

use tokio::sync::broadcast;

use crate::job::JobPayload;

/// Default buffered capacity of the bus.
const BUS_CAPACITY: usize = 256;

/// A lifecycle notification.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A worker is checking a queue for work.
    Poll { worker: String, queue: String },

    /// A job is about to run.
    Job {
        worker: String,
        queue: String,
        job: JobPayload,
    },

    /// A job completed and its counters were recorded.
    Success {
        worker: String,
        queue: String,
        job: JobPayload,
    },

    /// A poll error or job failure.
    Error {
        worker: String,
        queue: String,
        job: Option<JobPayload>,
        error: String,
    },
}

/// Broadcast bus for lifecycle notifications.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Create a new bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Emit a notification. A bus with no subscribers drops it.
    pub fn emit(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_see_emitted_notifications() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe();

        bus.emit(Notification::Poll {
            worker: "w1".to_string(),
            queue: "emails".to_string(),
        });

        match rx.recv().await.unwrap() {
            Notification::Poll { worker, queue } => {
                assert_eq!(worker, "w1");
                assert_eq!(queue, "emails");
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = NotificationBus::new();
        bus.emit(Notification::Error {
            worker: "w1".to_string(),
            queue: "q".to_string(),
            job: None,
            error: "store unreachable".to_string(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = NotificationBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let job = JobPayload::new("task", vec![json!(1)], 9);
        bus.emit(Notification::Success {
            worker: "w1".to_string(),
            queue: "q".to_string(),
            job,
        });

        assert!(matches!(a.recv().await.unwrap(), Notification::Success { .. }));
        assert!(matches!(b.recv().await.unwrap(), Notification::Success { .. }));
    }
}
