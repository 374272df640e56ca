//! Redis service: the pooled command handle.

use redis::AsyncCommands;

use crate::{
    RedisConfig, RedisError, Result,
    pool::{RedisConnection, RedisPool, RedisPoolBuilder},
    pubsub::PubSub,
};

/// Redis service providing a connection pool and the store primitives the
/// queue protocol is built on: string get/set, atomic list push/pop, set
/// add/remove/members, counter increment, and publish.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Create a new Redis service.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = RedisPoolBuilder::new(config.clone()).build().await?;
        Ok(Self { config, pool })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> Result<RedisConnection<'_>> {
        let conn = self.pool.get().await?;
        Ok(RedisConnection::new(conn))
    }

    /// Create a Pub/Sub client over the same server.
    pub fn pubsub(&self) -> Result<PubSub> {
        PubSub::new(self.config.clone())
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
        Ok(())
    }

    // String primitives

    /// Get a value.
    pub async fn get_value<T: redis::FromRedisValue>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get().await?;
        let value: Option<T> = conn.get(key).await?;
        Ok(value)
    }

    /// Set a value.
    pub async fn set_value<T: redis::ToRedisArgs + Send + Sync + redis::ToSingleRedisArg>(
        &self,
        key: &str,
        value: T,
    ) -> Result<()> {
        let mut conn = self.get().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    /// Delete a key. Returns whether a key was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get().await?;
        let deleted: u32 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    /// Delete multiple keys. Returns the number removed.
    pub async fn delete_all(&self, keys: &[String]) -> Result<u32> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get().await?;
        let deleted: u32 = conn.del(keys).await?;
        Ok(deleted)
    }

    /// Check if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// Increment a counter.
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.get().await?;
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    // List primitives (FIFO: RPUSH to enqueue, LPOP to dequeue)

    /// Push a value onto the tail of a list. Returns the new length.
    pub async fn rpush<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        value: T,
    ) -> Result<u64> {
        let mut conn = self.get().await?;
        let len: u64 = conn.rpush(key, value).await?;
        Ok(len)
    }

    /// Pop a value from the head of a list, non-blocking.
    pub async fn lpop<T: redis::FromRedisValue>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get().await?;
        let value: Option<T> = conn.lpop(key, None).await?;
        Ok(value)
    }

    /// Get the length of a list.
    pub async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.get().await?;
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    /// Get a range of list elements.
    pub async fn lrange<T: redis::FromRedisValue>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<T>> {
        let mut conn = self.get().await?;
        let values: Vec<T> = conn.lrange(key, start, stop).await?;
        Ok(values)
    }

    // Set primitives

    /// Add a member to a set. Returns whether it was newly added.
    pub async fn sadd<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        member: T,
    ) -> Result<bool> {
        let mut conn = self.get().await?;
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    /// Remove a member from a set. Returns whether it was present.
    pub async fn srem<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        member: T,
    ) -> Result<bool> {
        let mut conn = self.get().await?;
        let removed: u64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    /// Get all members of a set.
    pub async fn smembers<T: redis::FromRedisValue>(&self, key: &str) -> Result<Vec<T>> {
        let mut conn = self.get().await?;
        let members: Vec<T> = conn.smembers(key).await?;
        Ok(members)
    }

    /// Check set membership.
    pub async fn sismember<T: redis::ToRedisArgs + Send + Sync + redis::ToSingleRedisArg>(
        &self,
        key: &str,
        member: T,
    ) -> Result<bool> {
        let mut conn = self.get().await?;
        let is_member: bool = conn.sismember(key, member).await?;
        Ok(is_member)
    }

    // Pub/Sub

    /// Publish a message to a channel. Returns the receiver count.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u32> {
        let mut conn = self.get().await?;
        let receivers: u32 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut *conn)
            .await
            .map_err(|e| RedisError::Command(e.to_string()))?;
        Ok(receivers)
    }
}
