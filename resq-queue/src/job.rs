//! Job payloads and failure records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueueError;

/// Job unique identifier, drawn from the allocator's probe space.
pub type JobId = u32;

/// A job as it travels over the wire.
///
/// Wire format: `{ "class": "<functionName>", "args": [...], "id": <integer> }`.
/// Created by the producer at enqueue time, consumed exactly once by whichever
/// worker pops it, immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Handler name the worker looks up.
    pub class: String,

    /// Ordered positional arguments, passed to the handler verbatim.
    pub args: Vec<Value>,

    /// Allocated job id.
    pub id: JobId,
}

impl JobPayload {
    /// Create a new job payload.
    pub fn new(class: impl Into<String>, args: Vec<Value>, id: JobId) -> Self {
        Self {
            class: class.into(),
            args,
            id,
        }
    }
}

/// A record appended to the durable failed-jobs list. Never removed by this
/// system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePayload {
    /// Display name of the worker that hit the failure.
    pub worker: String,

    /// Error message.
    pub error: String,

    /// Error class name.
    pub exception: String,

    /// Backtrace lines, when one is available.
    pub backtrace: Option<Vec<String>>,

    /// The original job payload, or the raw string when it could not be
    /// decoded.
    pub payload: Value,

    /// When the failure happened.
    pub failed_at: DateTime<Utc>,
}

impl FailurePayload {
    /// Record a failure for a decoded job.
    pub fn new(worker: impl Into<String>, error: &QueueError, job: &JobPayload) -> Self {
        Self {
            worker: worker.into(),
            error: error.to_string(),
            exception: error.kind().to_string(),
            backtrace: None,
            payload: serde_json::to_value(job).unwrap_or(Value::Null),
            failed_at: Utc::now(),
        }
    }

    /// Record a failure for a payload that never decoded into a job.
    pub fn from_raw(worker: impl Into<String>, error: &QueueError, raw: &str) -> Self {
        Self {
            worker: worker.into(),
            error: error.to_string(),
            exception: error.kind().to_string(),
            backtrace: None,
            payload: Value::String(raw.to_string()),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_wire_format() {
        let payload = JobPayload::new("add", vec![json!(1), json!(2)], 42);
        let wire = serde_json::to_value(&payload).unwrap();

        assert_eq!(wire, json!({"class": "add", "args": [1, 2], "id": 42}));
    }

    #[test]
    fn test_payload_round_trip_preserves_arg_order() {
        let args = vec![json!("b"), json!("a"), json!(3), json!(null)];
        let payload = JobPayload::new("multi", args.clone(), 7);

        let raw = serde_json::to_string(&payload).unwrap();
        let decoded: JobPayload = serde_json::from_str(&raw).unwrap();

        assert_eq!(decoded.args, args);
        assert_eq!(decoded.class, "multi");
        assert_eq!(decoded.id, 7);
    }

    #[test]
    fn test_payload_decodes_foreign_producer_format() {
        let raw = r#"{"class":"send_email","args":["a@example.com"],"id":99}"#;
        let payload: JobPayload = serde_json::from_str(raw).unwrap();

        assert_eq!(payload.class, "send_email");
        assert_eq!(payload.args.len(), 1);
        assert_eq!(payload.id, 99);
    }

    #[test]
    fn test_failure_payload_carries_original_job() {
        let job = JobPayload::new("nonexistent", vec![], 5);
        let err = QueueError::MissingHandler("nonexistent".to_string());
        let failure = FailurePayload::new("w1", &err, &job);

        assert_eq!(failure.worker, "w1");
        assert_eq!(failure.exception, "MissingHandler");
        assert!(failure.error.contains("nonexistent"));
        assert_eq!(failure.payload["class"], json!("nonexistent"));
        assert_eq!(failure.payload["id"], json!(5));
    }

    #[test]
    fn test_failure_payload_from_raw_keeps_raw_string() {
        let err = QueueError::Deserialization("bad json".to_string());
        let failure = FailurePayload::from_raw("w1", &err, "not-json");

        assert_eq!(failure.payload, json!("not-json"));
        assert_eq!(failure.exception, "Deserialization");
    }

    #[test]
    fn test_failure_payload_serializes() {
        let job = JobPayload::new("task", vec![json!(1)], 1);
        let err = QueueError::ExecutionFailed("boom".to_string());
        let failure = FailurePayload::new("w1", &err, &job);

        let raw = serde_json::to_string(&failure).unwrap();
        assert!(raw.contains("failed_at"));
        assert!(raw.contains("boom"));
    }
}
