//! # resq-redis
//!
//! Redis client integration for the resq job queue.
//!
//! ## Features
//!
//! - **Connection Pooling**: Efficient connection management with bb8
//! - **Pub/Sub**: Redis pub/sub messaging with per-channel subscriptions
//! - **Store Primitives**: The string/list/set/counter operations the queue
//!   protocol is built on
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resq_redis::{RedisService, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .pool_size(10)
//!         .build();
//!
//!     let redis = RedisService::new(config).await?;
//!
//!     redis.set_value("key", "value").await?;
//!     let value: Option<String> = redis.get_value("key").await?;
//!     assert_eq!(value.as_deref(), Some("value"));
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod pubsub;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisConnection, RedisPool, RedisPoolBuilder};
pub use pubsub::{Message, PubSub, Subscription};
pub use service::RedisService;

// Re-export redis crate for convenience
pub use redis;
pub use redis::{AsyncCommands, RedisResult, Value};

/// Prelude for common imports.
///
/// ```
/// use resq_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::pool::{RedisConnection, RedisPool};
    pub use crate::pubsub::{Message, PubSub, Subscription};
    pub use crate::service::RedisService;
    pub use redis::AsyncCommands;
}
