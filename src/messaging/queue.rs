//! # Queue Port
//!
//! The adapter contract between the worker pool and a networked queue
//! service with at-least-once delivery and visibility-timeout leases.

use std::time::Duration;

use async_trait::async_trait;

use crate::messaging::errors::MessagingError;
use crate::messaging::message::TransportMessage;

/// Queue service port.
///
/// `consume` blocks up to `timeout` and returns `None` on an empty queue —
/// that is not an error. A returned message is leased for `ttr`; unless acked
/// within that window the queue makes it visible again on its own. Transport
/// failures are reported to the caller and are never fatal to the pool.
#[async_trait]
pub trait QueueDriver: Send + Sync {
    /// Pull one message, blocking up to `timeout`.
    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        ttr: Duration,
    ) -> Result<Option<TransportMessage>, MessagingError>;

    /// Permanently remove a message. Acking twice may error but must not
    /// corrupt queue state.
    async fn ack(&self, queue: &str, job_id: &str) -> Result<(), MessagingError>;

    /// Enqueue a new message. `ttl` and `delay` may both be zero. Returns
    /// the queue-assigned job id.
    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        ttl: Duration,
        delay: Duration,
    ) -> Result<String, MessagingError>;

    /// Dead-letter a message so it is never redelivered.
    async fn bury(&self, queue: &str, job_id: &str, payload: &[u8])
        -> Result<(), MessagingError>;

    /// Requeue a message for retry after `delay`.
    async fn release(
        &self,
        queue: &str,
        job_id: &str,
        payload: &[u8],
        delay: Duration,
    ) -> Result<(), MessagingError>;
}
