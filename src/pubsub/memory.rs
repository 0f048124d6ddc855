//! In-memory pub/sub adapter for tests: one broadcast channel per name,
//! same non-durable semantics as the Redis adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::pubsub::{PubSubDriver, PubSubError};

const CHANNEL_CAPACITY: usize = 16;

/// Cloneable in-memory bus; clones share the same channels.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPubSub {
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl PubSubDriver for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PubSubError> {
        // a send error just means nobody is subscribed, which is fine
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<String>, PubSubError> {
        let mut rx = self.sender(channel).subscribe();
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(payload)) => Ok(Some(payload)),
            Ok(Err(_)) | Err(_) => Ok(None),
        }
    }
}
