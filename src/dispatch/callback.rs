//! # Callback Consumer
//!
//! Closes the async loop on the producer side: consumes completion
//! messages from the callback queue, persists them through the repository
//! port, then notifies the correlation channel so an in-flight smart wait
//! can return inline.
//!
//! Ack discipline: a message that cannot parse is acked (it will never
//! parse better on redelivery); a message whose persistence fails is left
//! unacked so the lease retries it; a failed channel notification is
//! logged only, because the durable write already succeeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::CallbackConsumerConfig;
use crate::messaging::{QueueDriver, TransportMessage};
use crate::pubsub::{result_channel, PubSubDriver};
use crate::shutdown::{ShutdownListener, ShutdownSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Completion message emitted by a worker after diagnosing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub request_id: String,
    pub order_id: String,
    #[serde(default)]
    pub account_id: i64,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub processed_at: i64,
}

impl CallbackMessage {
    /// Payload sent on the correlation channel: the diagnosis result for a
    /// success, a status/error pair for a failure.
    pub fn notification_payload(&self) -> serde_json::Value {
        match (&self.status, &self.diagnosis_result) {
            (CallbackStatus::Success, Some(result)) => result.clone(),
            _ => serde_json::json!({
                "status": self.status,
                "error": self.error,
            }),
        }
    }
}

#[derive(Error, Debug)]
#[error("result repository error: {message}")]
pub struct RepositoryError {
    pub message: String,
}

impl RepositoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Persistence port for completed diagnoses. The engine never talks to
/// storage directly.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn record(&self, callback: &CallbackMessage) -> Result<(), RepositoryError>;
}

pub struct CallbackConsumer {
    shutdown: ShutdownSignal,
    handle: Option<JoinHandle<()>>,
}

impl CallbackConsumer {
    pub fn start(
        queue: Arc<dyn QueueDriver>,
        pubsub: Arc<dyn PubSubDriver>,
        repository: Arc<dyn ResultRepository>,
        config: CallbackConsumerConfig,
    ) -> Self {
        let shutdown = ShutdownSignal::new();
        let listener = shutdown.listener();
        info!(queue = %config.queue_name, "callback consumer started");
        let handle = tokio::spawn(async move {
            consume_loop(queue, pubsub, repository, config, listener).await;
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait for it to finish the message in hand.
    pub async fn shutdown(&mut self) {
        self.shutdown.fire();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("callback consumer stopped");
    }
}

async fn consume_loop(
    queue: Arc<dyn QueueDriver>,
    pubsub: Arc<dyn PubSubDriver>,
    repository: Arc<dyn ResultRepository>,
    config: CallbackConsumerConfig,
    mut listener: ShutdownListener,
) {
    let timeout = Duration::from_secs(config.timeout_secs);
    let ttr = Duration::from_secs(config.ttr_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    while !listener.is_fired() {
        match queue.consume(&config.queue_name, timeout, ttr).await {
            Ok(Some(message)) => {
                handle_callback(&*queue, &*pubsub, &*repository, &config.queue_name, message)
                    .await;
            }
            Ok(None) => {
                // Idle pause so a zero/short consume timeout cannot spin.
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = listener.fired() => break,
                }
            }
            Err(err) => {
                warn!(
                    queue = %config.queue_name,
                    error = %err,
                    "callback consume failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = listener.fired() => break,
                }
            }
        }
    }
}

async fn handle_callback(
    queue: &dyn QueueDriver,
    pubsub: &dyn PubSubDriver,
    repository: &dyn ResultRepository,
    queue_name: &str,
    message: TransportMessage,
) {
    let callback = match parse_callback(&message.data) {
        Ok(callback) => callback,
        Err(reason) => {
            warn!(
                job_id = %message.id,
                reason = %reason,
                "unparseable callback, acking to avoid a poison loop"
            );
            if let Err(err) = queue.ack(queue_name, &message.id).await {
                warn!(job_id = %message.id, error = %err, "ack of poison callback failed");
            }
            return;
        }
    };

    info!(
        job_id = %message.id,
        order_id = %callback.order_id,
        request_id = %callback.request_id,
        status = ?callback.status,
        "processing callback"
    );

    if let Err(err) = repository.record(&callback).await {
        // Leave unacked; the lease redelivers it.
        error!(
            job_id = %message.id,
            order_id = %callback.order_id,
            error = %err,
            "persisting callback failed, leaving for redelivery"
        );
        return;
    }

    // Best-effort notification: the waiter may have already timed out.
    let channel = result_channel(&callback.order_id);
    let payload = callback.notification_payload().to_string();
    if let Err(err) = pubsub.publish(&channel, &payload).await {
        warn!(
            order_id = %callback.order_id,
            channel = %channel,
            error = %err,
            "correlation notification failed"
        );
    }

    if let Err(err) = queue.ack(queue_name, &message.id).await {
        error!(
            job_id = %message.id,
            order_id = %callback.order_id,
            error = %err,
            "callback ack failed, message will redeliver"
        );
    }
}

fn parse_callback(raw: &[u8]) -> Result<CallbackMessage, String> {
    let callback: CallbackMessage =
        serde_json::from_slice(raw).map_err(|e| format!("json unmarshal failed: {e}"))?;
    if callback.order_id.is_empty() {
        return Err("order_id is required".to_string());
    }
    Ok(callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryQueue;
    use crate::pubsub::{InMemoryPubSub, PubSubDriver};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingRepo {
        records: Mutex<Vec<CallbackMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl ResultRepository for RecordingRepo {
        async fn record(&self, callback: &CallbackMessage) -> Result<(), RepositoryError> {
            if self.fail {
                return Err(RepositoryError::new("db unavailable"));
            }
            self.records.lock().await.push(callback.clone());
            Ok(())
        }
    }

    fn config() -> CallbackConsumerConfig {
        CallbackConsumerConfig {
            queue_name: "callback".into(),
            timeout_secs: 0,
            ttr_secs: 30,
            poll_interval_ms: 10,
        }
    }

    fn success_callback(order_id: &str) -> Vec<u8> {
        serde_json::to_vec(&CallbackMessage {
            request_id: "req-1".into(),
            order_id: order_id.into(),
            account_id: 42,
            status: CallbackStatus::Success,
            diagnosis_result: Some(serde_json::json!({"items": [{"carrier": "FedEx"}]})),
            error: String::new(),
            processed_at: 1_700_000_000,
        })
        .unwrap()
    }

    async fn wait_for_ack(queue: &InMemoryQueue, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while queue.acked().await.len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "callback not acked in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn success_callback_is_persisted_notified_and_acked() {
        let queue = InMemoryQueue::new();
        let pubsub = InMemoryPubSub::new();
        let repo = Arc::new(RecordingRepo::default());

        queue
            .publish("callback", &success_callback("ord-1"), Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();

        // Subscribe before the consumer can publish the notification.
        let waiter = {
            let pubsub = pubsub.clone();
            tokio::spawn(async move {
                pubsub
                    .subscribe(&result_channel("ord-1"), Duration::from_secs(2))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut consumer = CallbackConsumer::start(
            Arc::new(queue.clone()),
            Arc::new(pubsub),
            repo.clone(),
            config(),
        );

        wait_for_ack(&queue, 1).await;
        consumer.shutdown().await;

        assert_eq!(repo.records.lock().await.len(), 1);
        let notified = waiter.await.unwrap().unwrap().expect("no notification");
        let payload: serde_json::Value = serde_json::from_str(&notified).unwrap();
        assert_eq!(payload["items"][0]["carrier"], "FedEx");
    }

    #[tokio::test]
    async fn unparseable_callback_is_acked_without_persistence() {
        let queue = InMemoryQueue::new();
        let repo = Arc::new(RecordingRepo::default());

        queue
            .publish("callback", b"{not json", Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();

        let mut consumer = CallbackConsumer::start(
            Arc::new(queue.clone()),
            Arc::new(InMemoryPubSub::new()),
            repo.clone(),
            config(),
        );
        wait_for_ack(&queue, 1).await;
        consumer.shutdown().await;

        assert!(repo.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_leaves_message_unacked() {
        let queue = InMemoryQueue::new();
        let repo = Arc::new(RecordingRepo {
            records: Mutex::new(Vec::new()),
            fail: true,
        });

        queue
            .publish("callback", &success_callback("ord-2"), Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();

        let mut consumer = CallbackConsumer::start(
            Arc::new(queue.clone()),
            Arc::new(InMemoryPubSub::new()),
            repo,
            config(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        consumer.shutdown().await;

        assert!(queue.acked().await.is_empty());
    }

    #[tokio::test]
    async fn failure_callback_notifies_status_and_error() {
        let message = CallbackMessage {
            request_id: "req-9".into(),
            order_id: "ord-9".into(),
            account_id: 1,
            status: CallbackStatus::Failed,
            diagnosis_result: None,
            error: "carrier api unreachable".into(),
            processed_at: 1_700_000_000,
        };
        let payload = message.notification_payload();
        assert_eq!(payload["status"], "FAILED");
        assert_eq!(payload["error"], "carrier api unreachable");
    }
}
