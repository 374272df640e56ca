//! Redis Pub/Sub support.

use futures::StreamExt;
use redis::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{RedisConfig, RedisError, Result};

/// A Redis Pub/Sub message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Channel name.
    pub channel: String,
    /// Message payload.
    pub payload: String,
}

/// A subscription handle.
///
/// Dropping the handle closes the receiver, which stops the forwarding task
/// and releases the underlying pub/sub connection. This is the unsubscribe
/// mechanism.
pub struct Subscription {
    /// Receiver for messages.
    receiver: mpsc::Receiver<Message>,
    /// Channel name.
    channel: String,
}

impl Subscription {
    /// Create a new subscription.
    fn new(receiver: mpsc::Receiver<Message>, channel: String) -> Self {
        Self { receiver, channel }
    }

    /// Get the channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

/// Redis Pub/Sub client.
pub struct PubSub {
    client: Client,
}

impl PubSub {
    /// Create a new Pub/Sub client.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url();
        let client = Client::open(url).map_err(|e| RedisError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Subscribe to a channel.
    ///
    /// The returned `Subscription` is live once this call completes: the
    /// SUBSCRIBE command has been confirmed by the server before the
    /// forwarding task starts.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(100);
        let channel_name = channel.to_string();

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        pubsub
            .subscribe(&channel_name)
            .await
            .map_err(|e| RedisError::PubSub(e.to_string()))?;

        info!(channel = %channel_name, "Subscribed to Redis channel");

        // Spawn task to receive messages. Selecting on receiver closure means
        // a dropped Subscription releases the SUBSCRIBE and this task right
        // away, not at the next message.
        let channel_clone = channel_name.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    maybe = stream.next() => {
                        let Some(msg) = maybe else { break };

                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                error!(error = %e, "Failed to get message payload");
                                continue;
                            }
                        };

                        let message = Message {
                            channel: msg.get_channel_name().to_string(),
                            payload,
                        };

                        debug!(channel = %message.channel, "Received pub/sub message");

                        if tx.send(message).await.is_err() {
                            debug!(channel = %channel_clone, "Subscription receiver dropped");
                            break;
                        }
                    }
                    _ = tx.closed() => {
                        debug!(channel = %channel_clone, "Subscription receiver dropped");
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, channel_name))
    }

    /// Publish a message to a channel.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u32> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let receivers: u32 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisError::Command(e.to_string()))?;

        debug!(channel = %channel, receivers = receivers, "Published message");

        Ok(receivers)
    }
}
