//! End-to-end lifecycle over the in-memory adapters: dispatch a job,
//! process it through the worker pool, consume its callback, and close
//! the smart-wait loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use diagsync_core::config::{
    CallbackConsumerConfig, ProcessorConfig, SubscriberConfig, WorkerConfig,
};
use diagsync_core::dispatch::callback::RepositoryError;
use diagsync_core::dispatch::{
    CallbackConsumer, CallbackMessage, DispatchOutcome, DispatchRequest, Dispatcher,
    ResultRepository,
};
use diagsync_core::handlers::build_registry;
use diagsync_core::ids::RequestIdGenerator;
use diagsync_core::messaging::{InMemoryQueue, QueueDriver};
use diagsync_core::pubsub::InMemoryPubSub;
use diagsync_core::worker::{Manager, Worker};

const JOB_QUEUE: &str = "diagnose_queue";
const CALLBACK_QUEUE: &str = "callback";

#[derive(Default)]
struct RecordingRepo {
    records: Mutex<Vec<CallbackMessage>>,
}

#[async_trait]
impl ResultRepository for RecordingRepo {
    async fn record(&self, callback: &CallbackMessage) -> Result<(), RepositoryError> {
        self.records.lock().await.push(callback.clone());
        Ok(())
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        name: "order-diagnose".into(),
        queue_name: JOB_QUEUE.into(),
        callback_queue: CALLBACK_QUEUE.into(),
        subscriber: SubscriberConfig {
            threads: 2,
            rate_ms: 5,
            timeout_secs: 0,
            ttr_secs: 30,
            error_backoff_ms: 10,
        },
        processor: ProcessorConfig {
            threads: 2,
            buffer_size: 8,
            timeout_ms: 2_000,
            retry_delay_secs: 0,
        },
    }
}

fn consumer_config() -> CallbackConsumerConfig {
    CallbackConsumerConfig {
        queue_name: CALLBACK_QUEUE.into(),
        timeout_secs: 0,
        ttr_secs: 30,
        poll_interval_ms: 10,
    }
}

fn diagnose_request(order_id: &str) -> DispatchRequest {
    DispatchRequest {
        org_id: "0".into(),
        action_type: "order_diagnose".into(),
        business_id: order_id.into(),
        data: json!({
            "order_id": order_id,
            "account_id": 42,
            "merchant_order_no": "M-1000",
            "shipment": {
                "ship_from": {"country": "US"},
                "ship_to": {"country": "DE"},
                "parcels": [
                    {"weight": {"value": 2.5}, "items": [{"sku": "SKU-1"}]}
                ]
            }
        }),
    }
}

fn start_worker(queue: &InMemoryQueue) -> Manager {
    let queue: Arc<dyn QueueDriver> = Arc::new(queue.clone());
    let registry = build_registry(Arc::clone(&queue), CALLBACK_QUEUE.into()).unwrap();
    let mut manager = Manager::new();
    manager.add_worker(Worker::new(
        worker_config(),
        queue,
        Arc::new(registry),
        RequestIdGenerator::new(),
    ));
    manager.start().unwrap();
    manager
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatched_job_completes_within_smart_wait() {
    let queue = InMemoryQueue::new();
    let pubsub = InMemoryPubSub::new();
    let repo = Arc::new(RecordingRepo::default());

    let mut manager = start_worker(&queue);
    let mut consumer = CallbackConsumer::start(
        Arc::new(queue.clone()),
        Arc::new(pubsub.clone()),
        repo.clone(),
        consumer_config(),
    );

    let dispatcher = Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(pubsub.clone()),
        JOB_QUEUE.into(),
        RequestIdGenerator::new(),
    );
    let outcome = dispatcher
        .dispatch(diagnose_request("ord-e2e-1"), Duration::from_secs(3))
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Completed(result) => {
            assert_eq!(result["items"][0]["type"], "shipping");
            assert_eq!(result["items"][1]["type"], "anomaly");
        }
        other => panic!("expected inline completion, got {other:?}"),
    }

    manager.shutdown().await;
    consumer.shutdown().await;

    let records = repo.records.lock().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, "ord-e2e-1");
    // Both the job and its callback message were acked.
    assert_eq!(queue.acked().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_wait_dispatch_is_processed_asynchronously() {
    let queue = InMemoryQueue::new();
    let pubsub = InMemoryPubSub::new();

    let dispatcher = Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(pubsub),
        JOB_QUEUE.into(),
        RequestIdGenerator::new(),
    );
    let outcome = dispatcher
        .dispatch(diagnose_request("ord-e2e-2"), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Processing {
            business_id: "ord-e2e-2".into()
        }
    );

    let mut manager = start_worker(&queue);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while queue.acked().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job was not processed in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    manager.shutdown().await;

    // The callback waits on its queue for the consumer-side process.
    assert_eq!(queue.ready_len(CALLBACK_QUEUE).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_completion_falls_back_then_notifies_nobody() {
    let queue = InMemoryQueue::new();
    let pubsub = InMemoryPubSub::new();
    let repo = Arc::new(RecordingRepo::default());

    // Dispatch with a short wait and no worker running: the wait elapses.
    let dispatcher = Dispatcher::new(
        Arc::new(queue.clone()),
        Arc::new(pubsub.clone()),
        JOB_QUEUE.into(),
        RequestIdGenerator::new(),
    );
    let outcome = dispatcher
        .dispatch(diagnose_request("ord-e2e-3"), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Processing {
            business_id: "ord-e2e-3".into()
        }
    );

    // The worker and consumer come up afterwards; the completion still
    // lands in the repository even though the waiter is long gone.
    let mut manager = start_worker(&queue);
    let mut consumer = CallbackConsumer::start(
        Arc::new(queue.clone()),
        Arc::new(pubsub),
        repo.clone(),
        consumer_config(),
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while repo.records.lock().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "late completion never persisted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    manager.shutdown().await;
    consumer.shutdown().await;

    let records = repo.records.lock().await;
    assert_eq!(records[0].order_id, "ord-e2e-3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn manager_shutdown_stops_workers_idempotently() {
    let queue = InMemoryQueue::new();
    let mut manager = start_worker(&queue);
    manager.shutdown().await;
    manager.shutdown().await;
    assert_eq!(manager.worker_count(), 1);
}
