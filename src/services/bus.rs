use crate::models::{ChannelEvent, RecordId};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur when publishing channel events
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Keyed publish/subscribe transport
///
/// Delivery is best-effort: an event published to a channel nobody is
/// listening on is dropped.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event, returning how many subscribers received it
    async fn publish(&self, channel: &str, event: &ChannelEvent) -> Result<usize, BusError>;
}

/// Channel name builder
pub struct ChannelKey;

impl ChannelKey {
    /// Channel a recipient listens on for new donors
    pub fn recipient(recipient_id: RecordId) -> String {
        format!("recipient:{}", recipient_id)
    }

    /// Channel a donor listens on for incoming requests
    pub fn donor(donor_id: RecordId) -> String {
        format!("donor:{}", donor_id)
    }

    /// Channel keyed by a party's email address
    pub fn email(address: &str) -> String {
        format!("email:{}", address.trim().to_lowercase())
    }
}

/// In-process bus backed by one broadcast channel per key
pub struct LocalBus {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelEvent>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Join a channel; dropping the receiver leaves it
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(channel).map_or(0, |tx| tx.receiver_count())
    }

    /// Number of channels with a live sender
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, channel: &str, event: &ChannelEvent) -> Result<usize, BusError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        let Some(sender) = channels.get(channel) else {
            tracing::trace!("No subscribers on {}, dropping {:?}", channel, event.kind);
            return Ok(0);
        };

        match sender.send(event.clone()) {
            Ok(delivered) => Ok(delivered),
            Err(_) => {
                // Every receiver has left
                channels.remove(channel);
                tracing::trace!("Pruned idle channel {}", channel);
                Ok(0)
            }
        }
    }
}

/// Bus that forwards events to Redis `PUBLISH`
pub struct RedisBus {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
        })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, channel: &str, event: &ChannelEvent) -> Result<usize, BusError> {
        let json = serde_json::to_string(event)?;

        let mut conn = self.redis.lock().await;
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(json)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        tracing::trace!("Published {:?} to {} ({} receivers)", event.kind, channel, receivers);
        Ok(receivers)
    }
}
