//! # Processor
//!
//! Consumes handed-off messages with a pool of consumer loops, runs each
//! through the processing pipeline, and applies the resulting queue
//! decision. On shutdown the pool switches to drain mode and finishes
//! every message already buffered before exiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ProcessorConfig;
use crate::ids::RequestIdGenerator;
use crate::messaging::{QueueDriver, TransportMessage};
use crate::processing::{process_message, Outcome};
use crate::registry::HandlerRegistry;
use crate::shutdown::{ShutdownListener, ShutdownSignal};

/// Processing stage of one worker.
pub struct Processor {
    queue_name: String,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Processor {
    /// Spawn `config.threads` consumer loops over the shared receiver.
    pub fn start(
        queue: Arc<dyn QueueDriver>,
        queue_name: String,
        config: ProcessorConfig,
        registry: Arc<HandlerRegistry>,
        ids: RequestIdGenerator,
        rx: mpsc::Receiver<TransportMessage>,
    ) -> Self {
        let shutdown = ShutdownSignal::new();
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(config.threads);
        for consumer_id in 0..config.threads {
            let queue = Arc::clone(&queue);
            let queue_name = queue_name.clone();
            let config = config.clone();
            let registry = Arc::clone(&registry);
            let ids = ids.clone();
            let rx = Arc::clone(&rx);
            let listener = shutdown.listener();
            handles.push(tokio::spawn(async move {
                consume_loop(consumer_id, queue, queue_name, config, registry, ids, rx, listener)
                    .await;
            }));
        }
        info!(
            queue = %queue_name,
            consumers = config.threads,
            "processor started"
        );
        Self {
            queue_name,
            shutdown,
            handles,
        }
    }

    /// Switch every consumer loop into drain mode.
    pub fn signal_shutdown(&self) {
        self.shutdown.fire();
    }

    /// Wait for every consumer loop to finish draining and exit.
    pub async fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!(queue = %self.queue_name, "processor stopped");
    }
}

#[allow(clippy::too_many_arguments)]
async fn consume_loop(
    consumer_id: usize,
    queue: Arc<dyn QueueDriver>,
    queue_name: String,
    config: ProcessorConfig,
    registry: Arc<HandlerRegistry>,
    ids: RequestIdGenerator,
    rx: Arc<Mutex<mpsc::Receiver<TransportMessage>>>,
    mut listener: ShutdownListener,
) {
    loop {
        // Hold the receiver lock only while waiting; processing happens
        // with the lock released so siblings keep consuming.
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                message = rx.recv() => message,
                _ = listener.fired() => None,
            }
        };

        match next {
            Some(message) => {
                handle_message(consumer_id, &queue, &queue_name, &config, &registry, &ids, message)
                    .await;
            }
            None => {
                if listener.is_fired() {
                    break;
                }
                // Channel closed without shutdown: intake is gone, nothing
                // more will arrive.
                debug!(queue = %queue_name, consumer_id, "handoff channel closed");
                return;
            }
        }
    }

    // Drain mode: everything already buffered still gets processed.
    loop {
        let next = rx.lock().await.try_recv().ok();
        match next {
            Some(message) => {
                handle_message(consumer_id, &queue, &queue_name, &config, &registry, &ids, message)
                    .await;
            }
            None => break,
        }
    }
    debug!(queue = %queue_name, consumer_id, "consumer drained");
}

async fn handle_message(
    consumer_id: usize,
    queue: &Arc<dyn QueueDriver>,
    queue_name: &str,
    config: &ProcessorConfig,
    registry: &HandlerRegistry,
    ids: &RequestIdGenerator,
    message: TransportMessage,
) {
    let decision =
        process_message(registry, ids, consumer_id, &message.data, config.timeout()).await;

    match decision.outcome {
        Outcome::Ack => {
            if let Err(err) = queue.ack(queue_name, &message.id).await {
                error!(
                    queue = %queue_name,
                    job_id = %message.id,
                    error = %err,
                    "ack failed, message will redeliver"
                );
            }
        }
        Outcome::Retry => {
            if config.retry_delay_secs > 0 {
                let delay = Duration::from_secs(config.retry_delay_secs);
                if let Err(err) = queue
                    .release(queue_name, &message.id, &message.data, delay)
                    .await
                {
                    error!(
                        queue = %queue_name,
                        job_id = %message.id,
                        error = %err,
                        "release failed, falling back to lease expiry"
                    );
                }
            } else {
                // No explicit delay configured: leave the message unacked
                // and let its lease expire.
                debug!(
                    queue = %queue_name,
                    job_id = %message.id,
                    "retryable failure, awaiting lease expiry"
                );
            }
        }
        Outcome::Bury => {
            if let Err(err) = queue.bury(queue_name, &message.id, &message.data).await {
                warn!(
                    queue = %queue_name,
                    job_id = %message.id,
                    error = %err,
                    "bury failed, message will redeliver"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryQueue, JobEnvelope, JobMeta};
    use crate::processing::ProcessingError;
    use crate::registry::{HandlerContext, HandlerFactory, JobHandler};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn pre_process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
            Ok(())
        }
        async fn process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
            Ok(())
        }
        async fn post_process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
            Ok(())
        }
        fn output(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    fn registry() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        let factory: HandlerFactory = Arc::new(|_meta: &JobMeta, _payload| {
            Ok(Box::new(NoopHandler) as Box<dyn JobHandler>)
        });
        registry.register("order_diagnose", factory).unwrap();
        Arc::new(registry)
    }

    fn config(threads: usize) -> ProcessorConfig {
        ProcessorConfig {
            threads,
            buffer_size: 16,
            timeout_ms: 1_000,
            retry_delay_secs: 0,
        }
    }

    fn job(action: &str, id: &str) -> Vec<u8> {
        JobEnvelope::new(
            format!("req-{id}"),
            "0".into(),
            action.into(),
            id.into(),
            serde_json::json!({}),
        )
        .to_bytes()
        .unwrap()
    }

    async fn lease(queue: &InMemoryQueue, name: &str, payload: Vec<u8>) -> TransportMessage {
        queue
            .publish(name, &payload, Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();
        queue
            .consume(name, Duration::from_millis(100), Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_message_is_acked_exactly_once() {
        let queue = InMemoryQueue::new();
        let message = lease(&queue, "q", job("order_diagnose", "ord-1")).await;

        let (tx, rx) = mpsc::channel(16);
        let mut processor = Processor::start(
            Arc::new(queue.clone()),
            "q".into(),
            config(2),
            registry(),
            RequestIdGenerator::new(),
            rx,
        );

        tx.send(message.clone()).await.unwrap();
        drop(tx);
        processor.signal_shutdown();
        processor.wait().await;

        let acked = queue.acked().await;
        assert_eq!(acked, vec![message.id]);
    }

    #[tokio::test]
    async fn unknown_action_is_buried() {
        let queue = InMemoryQueue::new();
        let message = lease(&queue, "q", job("order_refund", "ord-2")).await;

        let (tx, rx) = mpsc::channel(16);
        let mut processor = Processor::start(
            Arc::new(queue.clone()),
            "q".into(),
            config(1),
            registry(),
            RequestIdGenerator::new(),
            rx,
        );

        tx.send(message).await.unwrap();
        drop(tx);
        processor.signal_shutdown();
        processor.wait().await;

        assert_eq!(queue.buried("q").await.len(), 1);
        assert_eq!(queue.ready_len("q").await, 0);
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_messages() {
        let queue = InMemoryQueue::new();
        let mut messages = Vec::new();
        for i in 0..5 {
            messages.push(lease(&queue, "q", job("order_diagnose", &format!("ord-{i}"))).await);
        }

        let (tx, rx) = mpsc::channel(16);
        // Buffer everything before any consumer can run.
        for message in &messages {
            tx.send(message.clone()).await.unwrap();
        }

        let mut processor = Processor::start(
            Arc::new(queue.clone()),
            "q".into(),
            config(2),
            registry(),
            RequestIdGenerator::new(),
            rx,
        );
        processor.signal_shutdown();
        processor.wait().await;

        assert_eq!(queue.acked().await.len(), messages.len());
    }

    #[tokio::test]
    async fn retryable_failure_without_delay_leaves_message_leased() {
        struct FlakyHandler;
        #[async_trait]
        impl JobHandler for FlakyHandler {
            async fn pre_process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
                Ok(())
            }
            async fn process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
                Err(ProcessingError::retryable("upstream 503"))
            }
            async fn post_process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
                Ok(())
            }
            fn output(&self) -> serde_json::Value {
                serde_json::json!({})
            }
        }

        let mut reg = HandlerRegistry::new();
        let factory: HandlerFactory = Arc::new(|_meta: &JobMeta, _payload| {
            Ok(Box::new(FlakyHandler) as Box<dyn JobHandler>)
        });
        reg.register("order_diagnose", factory).unwrap();

        let queue = InMemoryQueue::new();
        let message = lease(&queue, "q", job("order_diagnose", "ord-9")).await;

        let (tx, rx) = mpsc::channel(16);
        let mut processor = Processor::start(
            Arc::new(queue.clone()),
            "q".into(),
            config(1),
            Arc::new(reg),
            RequestIdGenerator::new(),
            rx,
        );
        tx.send(message).await.unwrap();
        drop(tx);
        processor.signal_shutdown();
        processor.wait().await;

        // Not acked, not buried: redelivery happens via the lease.
        assert!(queue.acked().await.is_empty());
        assert!(queue.buried("q").await.is_empty());
    }
}
