//! # In-Memory Queue Driver
//!
//! A `QueueDriver` with real lease semantics (TTR expiry, delayed delivery,
//! dead-letter storage) for unit and integration tests. Behaves like the
//! HTTP service from the pool's point of view: consume blocks up to the
//! timeout, unacked messages become visible again after their TTR.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::messaging::errors::MessagingError;
use crate::messaging::message::TransportMessage;
use crate::messaging::queue::QueueDriver;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
struct StoredJob {
    id: String,
    data: Vec<u8>,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredJob>,
    delayed: Vec<(Instant, StoredJob)>,
    leased: HashMap<String, (Instant, StoredJob)>,
    dead: Vec<StoredJob>,
}

#[derive(Debug, Default)]
struct Shared {
    queues: HashMap<String, QueueState>,
    acked: Vec<String>,
}

/// Cloneable in-memory queue service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    shared: Arc<Mutex<Shared>>,
    seq: Arc<AtomicU64>,
    consume_calls: Arc<AtomicU64>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total consume calls issued against this driver, across queues.
    pub fn consume_calls(&self) -> u64 {
        self.consume_calls.load(Ordering::Relaxed)
    }

    /// Job ids acked so far, in ack order.
    pub async fn acked(&self) -> Vec<String> {
        self.shared.lock().await.acked.clone()
    }

    /// Raw payloads sitting in a queue's dead-letter store.
    pub async fn buried(&self, queue: &str) -> Vec<Vec<u8>> {
        let shared = self.shared.lock().await;
        shared
            .queues
            .get(queue)
            .map(|q| q.dead.iter().map(|j| j.data.clone()).collect())
            .unwrap_or_default()
    }

    /// Messages currently ready for delivery (excludes leased and delayed).
    pub async fn ready_len(&self, queue: &str) -> usize {
        let shared = self.shared.lock().await;
        shared.queues.get(queue).map(|q| q.ready.len()).unwrap_or(0)
    }

    fn next_job_id(&self) -> String {
        format!("job-{}", self.seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Promote delayed jobs whose time has come and reclaim expired leases.
    fn settle(state: &mut QueueState, now: Instant) {
        let mut due = Vec::new();
        state.delayed.retain(|(at, job)| {
            if *at <= now {
                due.push(job.clone());
                false
            } else {
                true
            }
        });
        for job in due {
            state.ready.push_back(job);
        }

        let expired: Vec<String> = state
            .leased
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some((_, job)) = state.leased.remove(&id) {
                state.ready.push_back(job);
            }
        }
    }
}

#[async_trait]
impl QueueDriver for InMemoryQueue {
    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        ttr: Duration,
    ) -> Result<Option<TransportMessage>, MessagingError> {
        self.consume_calls.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut shared = self.shared.lock().await;
                let state = shared.queues.entry(queue.to_string()).or_default();
                let now = Instant::now();
                Self::settle(state, now);

                if let Some(mut job) = state.ready.pop_front() {
                    job.deliveries += 1;
                    let message = TransportMessage {
                        id: job.id.clone(),
                        queue: queue.to_string(),
                        data: job.data.clone(),
                        attempts: Some(job.deliveries),
                    };
                    state.leased.insert(job.id.clone(), (now + ttr, job));
                    return Ok(Some(message));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, queue: &str, job_id: &str) -> Result<(), MessagingError> {
        let mut shared = self.shared.lock().await;
        let state = shared.queues.entry(queue.to_string()).or_default();
        if state.leased.remove(job_id).is_none() {
            // second ack or expired lease: report it, state stays consistent
            return Err(MessagingError::QueueOperation {
                queue_name: queue.to_string(),
                operation: "ack".to_string(),
                message: format!("job {job_id} is not leased"),
            });
        }
        shared.acked.push(job_id.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        _ttl: Duration,
        delay: Duration,
    ) -> Result<String, MessagingError> {
        let job = StoredJob {
            id: self.next_job_id(),
            data: payload.to_vec(),
            deliveries: 0,
        };
        let id = job.id.clone();

        let mut shared = self.shared.lock().await;
        let state = shared.queues.entry(queue.to_string()).or_default();
        if delay.is_zero() {
            state.ready.push_back(job);
        } else {
            state.delayed.push((Instant::now() + delay, job));
        }
        Ok(id)
    }

    async fn bury(
        &self,
        queue: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        let mut shared = self.shared.lock().await;
        let state = shared.queues.entry(queue.to_string()).or_default();
        let job = state
            .leased
            .remove(job_id)
            .map(|(_, job)| job)
            .unwrap_or_else(|| StoredJob {
                id: job_id.to_string(),
                data: payload.to_vec(),
                deliveries: 0,
            });
        state.dead.push(job);
        Ok(())
    }

    async fn release(
        &self,
        queue: &str,
        job_id: &str,
        payload: &[u8],
        delay: Duration,
    ) -> Result<(), MessagingError> {
        let mut shared = self.shared.lock().await;
        let state = shared.queues.entry(queue.to_string()).or_default();
        let job = state
            .leased
            .remove(job_id)
            .map(|(_, job)| job)
            .unwrap_or_else(|| StoredJob {
                id: job_id.to_string(),
                data: payload.to_vec(),
                deliveries: 0,
            });
        if delay.is_zero() {
            state.ready.push_back(job);
        } else {
            state.delayed.push((Instant::now() + delay, job));
        }
        Ok(())
    }
}
