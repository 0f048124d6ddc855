//! # Subscriber
//!
//! Pulls messages from one queue with a pool of polling loops and hands
//! them to the processing stage over a bounded channel. Polling is rate
//! limited per loop; transport errors back off instead of busy-looping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SubscriberConfig;
use crate::messaging::{QueueDriver, TransportMessage};
use crate::shutdown::{ShutdownListener, ShutdownSignal};

/// Polling stage of one worker. Owns its loops and a private shutdown
/// signal so the pool can stop intake before the processing stage drains.
pub struct Subscriber {
    queue_name: String,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl Subscriber {
    /// Spawn `config.threads` polling loops against `queue_name`. Each loop
    /// holds a clone of `tx`; when the last loop exits the channel closes.
    pub fn start(
        queue: Arc<dyn QueueDriver>,
        queue_name: String,
        config: SubscriberConfig,
        tx: mpsc::Sender<TransportMessage>,
    ) -> Self {
        let shutdown = ShutdownSignal::new();
        let mut handles = Vec::with_capacity(config.threads);
        for poller_id in 0..config.threads {
            let queue = Arc::clone(&queue);
            let queue_name = queue_name.clone();
            let config = config.clone();
            let tx = tx.clone();
            let listener = shutdown.listener();
            handles.push(tokio::spawn(async move {
                poll_loop(poller_id, queue, queue_name, config, tx, listener).await;
            }));
        }
        info!(
            queue = %queue_name,
            pollers = config.threads,
            "subscriber started"
        );
        Self {
            queue_name,
            shutdown,
            handles,
        }
    }

    /// Tell every polling loop to finish its current iteration and exit.
    pub fn stop(&self) {
        self.shutdown.fire();
    }

    /// Wait for all polling loops to exit. After this returns, no further
    /// message is handed to the channel.
    pub async fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!(queue = %self.queue_name, "subscriber stopped");
    }
}

async fn poll_loop(
    poller_id: usize,
    queue: Arc<dyn QueueDriver>,
    queue_name: String,
    config: SubscriberConfig,
    tx: mpsc::Sender<TransportMessage>,
    mut listener: ShutdownListener,
) {
    let rate = config.rate();
    loop {
        if listener.is_fired() {
            break;
        }
        let iteration_started = Instant::now();

        match queue
            .consume(&queue_name, config.timeout(), config.ttr())
            .await
        {
            Ok(Some(message)) => {
                debug!(
                    queue = %queue_name,
                    poller_id,
                    job_id = %message.id,
                    "message consumed"
                );
                // Backpressure point: a full buffer parks this poller here.
                // On shutdown the message is dropped unacked and comes back
                // via its TTR.
                tokio::select! {
                    sent = tx.send(message) => {
                        if sent.is_err() {
                            warn!(queue = %queue_name, poller_id, "handoff channel closed, stopping poller");
                            break;
                        }
                    }
                    _ = listener.fired() => break,
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    queue = %queue_name,
                    poller_id,
                    error = %err,
                    "consume failed, backing off"
                );
                if sleep_or_shutdown(config.error_backoff(), &mut listener).await {
                    break;
                }
            }
        }

        // Per-loop rate limit measured from iteration start, so a slow
        // consume already counts toward the interval.
        let elapsed = iteration_started.elapsed();
        if elapsed < rate && sleep_or_shutdown(rate - elapsed, &mut listener).await {
            break;
        }
    }
}

/// Sleep for `duration`, returning true if shutdown fired first.
async fn sleep_or_shutdown(duration: Duration, listener: &mut ShutdownListener) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = listener.fired() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryQueue, MessagingError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn config(rate_ms: u64, backoff_ms: u64) -> SubscriberConfig {
        SubscriberConfig {
            threads: 1,
            rate_ms,
            timeout_secs: 0,
            ttr_secs: 30,
            error_backoff_ms: backoff_ms,
        }
    }

    #[tokio::test]
    async fn delivers_consumed_messages_to_channel() {
        let queue = InMemoryQueue::new();
        queue
            .publish("q", b"hello", Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let mut subscriber =
            Subscriber::start(Arc::new(queue.clone()), "q".into(), config(10, 10), tx);

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no handoff within deadline")
            .expect("channel closed");
        assert_eq!(message.data, b"hello");

        subscriber.stop();
        subscriber.wait().await;
    }

    #[tokio::test]
    async fn no_handoffs_after_stop_and_wait() {
        let queue = InMemoryQueue::new();
        let (tx, mut rx) = mpsc::channel(4);
        let mut subscriber =
            Subscriber::start(Arc::new(queue.clone()), "q".into(), config(5, 5), tx);

        subscriber.stop();
        subscriber.wait().await;

        // Published after the pollers exited; must never arrive.
        queue
            .publish("q", b"late", Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();
        assert!(rx.recv().await.is_none(), "channel should be closed");
    }

    #[tokio::test]
    async fn polling_respects_rate_limit() {
        let queue = InMemoryQueue::new();
        let (tx, _rx) = mpsc::channel(4);
        let mut subscriber =
            Subscriber::start(Arc::new(queue.clone()), "q".into(), config(100, 10), tx);

        tokio::time::sleep(Duration::from_millis(350)).await;
        subscriber.stop();
        subscriber.wait().await;

        // At 100ms per iteration a single poller fits at most a handful of
        // consume calls into 350ms.
        assert!(
            queue.consume_calls() <= 6,
            "consume called {} times",
            queue.consume_calls()
        );
    }

    struct FailingQueue {
        calls: AtomicU64,
    }

    #[async_trait]
    impl QueueDriver for FailingQueue {
        async fn consume(
            &self,
            _queue: &str,
            _timeout: Duration,
            _ttr: Duration,
        ) -> Result<Option<TransportMessage>, MessagingError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(MessagingError::transport("connection refused"))
        }
        async fn ack(&self, _queue: &str, _job_id: &str) -> Result<(), MessagingError> {
            Ok(())
        }
        async fn publish(
            &self,
            _queue: &str,
            _payload: &[u8],
            _ttl: Duration,
            _delay: Duration,
        ) -> Result<String, MessagingError> {
            Ok("job-0".into())
        }
        async fn bury(
            &self,
            _queue: &str,
            _job_id: &str,
            _payload: &[u8],
        ) -> Result<(), MessagingError> {
            Ok(())
        }
        async fn release(
            &self,
            _queue: &str,
            _job_id: &str,
            _payload: &[u8],
            _delay: Duration,
        ) -> Result<(), MessagingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn transport_errors_back_off() {
        let queue = Arc::new(FailingQueue {
            calls: AtomicU64::new(0),
        });
        let (tx, _rx) = mpsc::channel(4);
        let mut subscriber = Subscriber::start(
            Arc::clone(&queue) as Arc<dyn QueueDriver>,
            "q".into(),
            config(0, 100),
            tx,
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        subscriber.stop();
        subscriber.wait().await;

        let calls = queue.calls.load(Ordering::Relaxed);
        assert!(calls <= 6, "consume called {calls} times despite backoff");
    }
}
