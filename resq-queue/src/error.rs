//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backing store error
    #[error("Redis error: {0}")]
    Redis(#[from] resq_redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// No handler registered for job class
    #[error("Missing job handler: {0}")]
    MissingHandler(String),

    /// Job execution failed
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Id allocation exhausted its probe budget
    #[error("Job id space exhausted")]
    IdSpaceExhausted,

    /// Worker identity read before queue resolution
    #[error("Worker identity is not resolved yet")]
    UnresolvedWorker,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("Queue error: {0}")]
    Other(String),
}

impl QueueError {
    /// Short name of the error class, used in failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Redis(_) => "Redis",
            Self::Serialization(_) => "Serialization",
            Self::Deserialization(_) => "Deserialization",
            Self::MissingHandler(_) => "MissingHandler",
            Self::ExecutionFailed(_) => "ExecutionFailed",
            Self::IdSpaceExhausted => "IdSpaceExhausted",
            Self::UnresolvedWorker => "UnresolvedWorker",
            Self::WorkerAlreadyRunning => "WorkerAlreadyRunning",
            Self::Config(_) => "Config",
            Self::Other(_) => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueueError::MissingHandler("send_email".to_string());
        assert!(format!("{}", err).contains("send_email"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(QueueError::MissingHandler("x".into()).kind(), "MissingHandler");
        assert_eq!(QueueError::IdSpaceExhausted.kind(), "IdSpaceExhausted");
        assert_eq!(QueueError::Other("boom".into()).kind(), "Error");
    }
}
