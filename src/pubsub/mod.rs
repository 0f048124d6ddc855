//! # PubSub Port
//!
//! Ephemeral pub/sub coordination for smart-wait correlation. Delivery is
//! not durable: either side of a channel may be absent at any time without
//! error, and a message published with no subscriber is simply lost.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryPubSub;
pub use redis::RedisPubSub;

#[derive(Error, Debug)]
pub enum PubSubError {
    #[error("Pub/sub connection error: {message}")]
    Connection { message: String },

    #[error("Pub/sub operation failed: {operation} on {channel}: {message}")]
    Operation {
        operation: String,
        channel: String,
        message: String,
    },
}

/// Pub/sub service port.
#[async_trait]
pub trait PubSubDriver: Send + Sync {
    /// Publish a payload to a channel, whether or not anyone is subscribed.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PubSubError>;

    /// Subscribe to a channel and wait up to `timeout` for one payload.
    /// `None` means the timeout elapsed — a designed outcome, not an error.
    async fn subscribe(
        &self,
        channel: &str,
        timeout: Duration,
    ) -> Result<Option<String>, PubSubError>;
}

/// Correlation channel naming convention shared by the dispatcher
/// (subscriber side) and the callback consumer (publisher side).
pub fn result_channel(business_id: &str) -> String {
    format!("diagnosis:result:{business_id}")
}
