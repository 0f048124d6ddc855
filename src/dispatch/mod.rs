//! # Dispatch
//!
//! Producer side of the engine: publish a job to the work queue, then
//! smart-wait on the correlation channel so a fast worker's result can be
//! returned to the synchronous caller inline. A timeout is the designed
//! fallback, not a failure.

pub mod callback;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::ids::RequestIdGenerator;
use crate::messaging::{JobEnvelope, QueueDriver};
use crate::pubsub::{result_channel, PubSubDriver};

pub use callback::{CallbackConsumer, CallbackMessage, CallbackStatus, ResultRepository};

/// One job to dispatch. `data` is the opaque handler payload.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub org_id: String,
    pub action_type: String,
    pub business_id: String,
    pub data: serde_json::Value,
}

/// What the synchronous caller gets back.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The result arrived on the correlation channel within the wait.
    Completed(serde_json::Value),
    /// Still in flight; retrieve later by business id.
    Processing { business_id: String },
}

pub struct Dispatcher {
    queue: Arc<dyn QueueDriver>,
    pubsub: Arc<dyn PubSubDriver>,
    queue_name: String,
    ids: RequestIdGenerator,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn QueueDriver>,
        pubsub: Arc<dyn PubSubDriver>,
        queue_name: String,
        ids: RequestIdGenerator,
    ) -> Self {
        Self {
            queue,
            pubsub,
            queue_name,
            ids,
        }
    }

    /// Publish the job, then wait up to `wait` for its result on the
    /// correlation channel. `wait` of zero skips the subscription entirely.
    ///
    /// The worker may complete before the subscription is established; that
    /// notification is lost by design and the call degrades to
    /// `Processing`, same as a plain timeout.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        wait: Duration,
    ) -> Result<DispatchOutcome> {
        let request_id = self.ids.next_id();
        let envelope = JobEnvelope::new(
            request_id.clone(),
            request.org_id,
            request.action_type,
            request.business_id.clone(),
            request.data,
        );
        let bytes = envelope.to_bytes().map_err(CoreError::Queue)?;

        let job_id = self
            .queue
            .publish(&self.queue_name, &bytes, Duration::ZERO, Duration::ZERO)
            .await
            .map_err(CoreError::Queue)?;
        info!(
            request_id = %request_id,
            business_id = %request.business_id,
            job_id = %job_id,
            queue = %self.queue_name,
            "job dispatched"
        );

        if wait.is_zero() {
            return Ok(DispatchOutcome::Processing {
                business_id: request.business_id,
            });
        }

        let channel = result_channel(&request.business_id);
        match self.pubsub.subscribe(&channel, wait).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(result) => {
                    debug!(
                        request_id = %request_id,
                        business_id = %request.business_id,
                        "result arrived within wait"
                    );
                    Ok(DispatchOutcome::Completed(result))
                }
                Err(err) => {
                    warn!(
                        business_id = %request.business_id,
                        error = %err,
                        "malformed result payload, falling back to async retrieval"
                    );
                    Ok(DispatchOutcome::Processing {
                        business_id: request.business_id,
                    })
                }
            },
            Ok(None) => {
                debug!(
                    request_id = %request_id,
                    business_id = %request.business_id,
                    wait_ms = wait.as_millis() as u64,
                    "wait elapsed, result pending"
                );
                Ok(DispatchOutcome::Processing {
                    business_id: request.business_id,
                })
            }
            Err(err) => {
                // The job is already queued; a broken subscription only
                // loses the inline shortcut.
                warn!(
                    business_id = %request.business_id,
                    error = %err,
                    "smart-wait subscription failed, falling back to async retrieval"
                );
                Ok(DispatchOutcome::Processing {
                    business_id: request.business_id,
                })
            }
        }
    }
}
