use async_trait::async_trait;
use futures::StreamExt;
use log::{ error, info, warn };
use redis::{ AsyncCommands, Client };
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ SharedStore, StoreEvent, EVENT_CAPACITY };
use crate::error::Result;

/// Store backed by redis keys, with change notifications on a pub/sub channel
/// so separate processes can act as tabs of one origin.
pub struct RedisStore {
    client: Client,
    key_prefix: String,
    channel: String,
    events: broadcast::Sender<StoreEvent>,
}

impl RedisStore {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let channel = format!("{}events", key_prefix);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        info!("Subscribed to redis channel {}", channel);

        let tx = events.clone();
        tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Ignoring non-text store notification: {}", e);
                        continue;
                    }
                };
                match serde_json::from_str::<StoreEvent>(&payload) {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(e) => {
                        error!("Error parsing store notification: {}", e);
                    }
                }
            }
            warn!("Redis store notification stream closed");
        });

        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            channel,
            events,
        })
    }

    async fn get_connection(&self) -> std::result::Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn publish(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        event: StoreEvent
    ) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        let _: i64 = conn.publish(&self.channel, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, origin: Uuid, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let previous: Option<String> = conn.getset(self.key(key), value).await?;
        if previous.as_deref() == Some(value) {
            return Ok(());
        }
        let event = StoreEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
            origin,
        };
        self.publish(&mut conn, event).await
    }

    async fn remove(&self, origin: Uuid, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.del(self.key(key)).await?;
        if removed == 0 {
            return Ok(());
        }
        let event = StoreEvent {
            key: key.to_string(),
            value: None,
            origin,
        };
        self.publish(&mut conn, event).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
