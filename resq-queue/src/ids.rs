//! Job-id allocation.
//!
//! Ids are random integers probed against the store: a candidate is rejected
//! if any value already exists under the raw (unnamespaced) integer key.
//! This is a best-effort local check, not a distributed lock; two concurrent
//! allocators can still pick the same id in a narrow window.

use rand::Rng;
use std::sync::Arc;

use resq_redis::RedisService;

use crate::error::{QueueError, QueueResult};
use crate::job::JobId;

/// Size of the id probe space.
pub const ID_SPACE: JobId = 1_000_000;

/// Probe attempts before allocation gives up with `IdSpaceExhausted`.
///
/// The original protocol retried forever; a bound turns a pathological spin
/// under near-full pending load into a reportable error without changing the
/// probe space.
pub const MAX_PROBE_ATTEMPTS: u32 = 1024;

/// Produces job identifiers not currently in use in the store.
#[derive(Clone)]
pub struct IdAllocator {
    redis: Arc<RedisService>,
}

impl IdAllocator {
    /// Create an allocator over the given store handle.
    pub fn new(redis: Arc<RedisService>) -> Self {
        Self { redis }
    }

    /// Allocate an id not currently in use.
    ///
    /// A store error is fatal to the specific enqueue attempt and is
    /// surfaced to the caller.
    pub async fn allocate(&self) -> QueueResult<JobId> {
        for _ in 0..MAX_PROBE_ATTEMPTS {
            let candidate: JobId = rand::rng().random_range(0..ID_SPACE);

            // Scratch probe on the raw integer key, outside the namespace
            let existing: Option<String> = self.redis.get_value(&candidate.to_string()).await?;
            if existing.is_none() {
                return Ok(candidate);
            }
        }
        Err(QueueError::IdSpaceExhausted)
    }
}
