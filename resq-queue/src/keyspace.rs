//! Redis key construction.
//!
//! Every key this system writes (except the id-collision probe, which is
//! deliberately unnamespaced) is prefixed by the configured namespace and
//! joined with `:`. Segment contents are not validated; callers must avoid
//! `:` in identifiers.

use crate::job::JobId;

/// Default namespace prefix.
pub const DEFAULT_NAMESPACE: &str = "resque";

/// Builds collision-free store keys by prefixing a configured namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeySpace {
    /// Create a key space with the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Get the namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Join the namespace and the given segments with `:`.
    pub fn key<I, S>(&self, segments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = self.namespace.clone();
        for segment in segments {
            key.push(':');
            key.push_str(segment.as_ref());
        }
        key
    }

    /// Set of known queue names.
    pub fn queues(&self) -> String {
        self.key(["queues"])
    }

    /// FIFO list of serialized job payloads for a queue.
    pub fn queue(&self, name: &str) -> String {
        self.key(["queue", name])
    }

    /// Set of active worker display names.
    pub fn workers(&self) -> String {
        self.key(["workers"])
    }

    /// Start timestamp for a worker.
    pub fn worker_started(&self, worker: &str) -> String {
        self.key(["worker", worker, "started"])
    }

    /// Global processed counter.
    pub fn stat_processed(&self) -> String {
        self.key(["stat", "processed"])
    }

    /// Per-worker processed counter.
    pub fn stat_processed_for(&self, worker: &str) -> String {
        self.key(["stat", "processed", worker])
    }

    /// Global failed counter.
    pub fn stat_failed(&self) -> String {
        self.key(["stat", "failed"])
    }

    /// Per-worker failed counter.
    pub fn stat_failed_for(&self, worker: &str) -> String {
        self.key(["stat", "failed", worker])
    }

    /// List of serialized failure payloads.
    pub fn failed(&self) -> String {
        self.key(["failed"])
    }

    /// Result-delivery key (and pub/sub channel of the same name) for a job.
    pub fn result(&self, id: JobId) -> String {
        self.key([id.to_string()])
    }
}
