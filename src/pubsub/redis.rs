//! Redis pub/sub adapter.
//!
//! Publishes over a multiplexed `ConnectionManager`; each subscribe opens a
//! dedicated pub/sub connection scoped to the wait, since a Redis connection
//! in subscriber mode cannot serve other commands.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use crate::config::RedisConfig;
use crate::pubsub::{PubSubDriver, PubSubError};

#[derive(Clone)]
pub struct RedisPubSub {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisPubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPubSub")
            .field("manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisPubSub {
    pub async fn from_config(config: &RedisConfig) -> Result<Self, PubSubError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            PubSubError::Connection {
                message: format!("failed to create redis client: {e}"),
            }
        })?;

        let manager = redis::aio::ConnectionManager::new(client.clone())
            .await
            .map_err(|e| PubSubError::Connection {
                message: format!("failed to connect to redis: {e}"),
            })?;

        debug!("redis pub/sub connected");
        Ok(Self { client, manager })
    }
}

#[async_trait]
impl PubSubDriver for RedisPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PubSubError> {
        let mut conn = self.manager.clone();
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| PubSubError::Operation {
                operation: "publish".to_string(),
                channel: channel.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<String>, PubSubError> {
        let mut pubsub =
            self.client
                .get_async_pubsub()
                .await
                .map_err(|e| PubSubError::Connection {
                    message: format!("failed to open pub/sub connection: {e}"),
                })?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| PubSubError::Operation {
                operation: "subscribe".to_string(),
                channel: channel.to_string(),
                message: e.to_string(),
            })?;

        let mut stream = pubsub.on_message();
        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(msg)) => {
                let payload: String =
                    msg.get_payload().map_err(|e| PubSubError::Operation {
                        operation: "subscribe".to_string(),
                        channel: channel.to_string(),
                        message: format!("payload decode failed: {e}"),
                    })?;
                Ok(Some(payload))
            }
            // stream closed: treat like a timeout, the waiter falls back to polling
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}
