//! # Message Processing Pipeline
//!
//! Turns one raw queue message into a queue decision: parse the envelope,
//! route by action type, construct the handler, run the three-phase
//! pipeline under a deadline, and map the result onto ack/retry/bury.
//!
//! A panic inside a handler invocation is caught at this boundary and
//! converted to a dead-letter outcome; it must never take down a consumer
//! loop or leak into sibling messages.

use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::ids::RequestIdGenerator;
use crate::messaging::parse_envelope;
use crate::processing::response::{ProcessingError, ProcessingResponse};
use crate::registry::{run_pipeline, HandlerContext, HandlerRegistry};

/// Queue action decided for a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pipeline succeeded: remove the message.
    Ack,
    /// Retryable failure or deadline overrun: make the message consumable
    /// again (explicit delayed release, or implicitly via its TTR).
    Retry,
    /// Permanent failure: dead-letter, never redeliver.
    Bury,
}

/// Outcome plus the uniform response produced for it (absent only when the
/// envelope never parsed).
#[derive(Debug)]
pub struct Decision {
    pub outcome: Outcome,
    pub response: Option<ProcessingResponse>,
}

/// Process one message end to end. Never panics and never returns a
/// transport error: every failure mode collapses into an `Outcome`.
pub async fn process_message(
    registry: &HandlerRegistry,
    ids: &RequestIdGenerator,
    worker_id: usize,
    raw: &[u8],
    deadline: Duration,
) -> Decision {
    // 1. Parse; malformed envelopes dead-letter without a handler.
    let (_envelope, meta, biz_payload) = match parse_envelope(raw, ids) {
        Ok(parsed) => parsed,
        Err(err) => {
            error!(error = %err, "envelope parse failed, burying message");
            return Decision {
                outcome: Outcome::Bury,
                response: None,
            };
        }
    };

    // 2. Route.
    let factory = match registry.resolve(&meta.action_type) {
        Ok(factory) => factory,
        Err(err) => {
            error!(
                request_id = %meta.request_id,
                action_type = %meta.action_type,
                error = %err,
                "no handler for action type, burying message"
            );
            return Decision {
                outcome: Outcome::Bury,
                response: Some(ProcessingResponse::failure(
                    ProcessingError::fatal(format!(
                        "no handler registered for action type: {}",
                        meta.action_type
                    )),
                    &meta,
                )),
            };
        }
    };

    // 3. Construct.
    let mut handler = match factory(&meta, biz_payload) {
        Ok(handler) => handler,
        Err(err) => {
            error!(
                request_id = %meta.request_id,
                action_type = %meta.action_type,
                error = %err,
                "handler construction failed, burying message"
            );
            return Decision {
                outcome: Outcome::Bury,
                response: Some(ProcessingResponse::failure(err, &meta)),
            };
        }
    };

    let ctx = HandlerContext::new(meta.request_id.clone(), worker_id);
    info!(
        request_id = %ctx.request_id,
        action_type = %meta.action_type,
        business_id = %meta.business_id,
        worker_id,
        "processing job"
    );

    // 4. Invoke under the deadline, with a panic fault boundary.
    let invocation = async {
        run_pipeline(handler.as_mut(), &ctx).await?;
        Ok::<serde_json::Value, crate::registry::PipelineFailure>(handler.output())
    };
    let guarded = std::panic::AssertUnwindSafe(invocation).catch_unwind();

    match tokio::time::timeout(deadline, guarded).await {
        // success
        Ok(Ok(Ok(output))) => Decision {
            outcome: Outcome::Ack,
            response: Some(ProcessingResponse::success(output, &meta)),
        },
        // phase failure: the retryable flag partitions retry vs bury
        Ok(Ok(Err(failure))) => {
            let outcome = if failure.error.retryable {
                Outcome::Retry
            } else {
                Outcome::Bury
            };
            warn!(
                request_id = %ctx.request_id,
                phase = %failure.phase,
                retryable = failure.error.retryable,
                error = %failure.error,
                "handler pipeline failed"
            );
            Decision {
                outcome,
                response: Some(ProcessingResponse::failure(failure.error, &meta)),
            }
        }
        // panic inside the invocation
        Ok(Err(panic)) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                request_id = %ctx.request_id,
                action_type = %meta.action_type,
                panic = %detail,
                "handler panicked, burying message"
            );
            Decision {
                outcome: Outcome::Bury,
                response: Some(ProcessingResponse::failure(
                    ProcessingError::fatal(format!("handler panicked: {detail}")),
                    &meta,
                )),
            }
        }
        // deadline elapsed: the lease guarantees redelivery, treat as retryable
        Err(_) => {
            warn!(
                request_id = %ctx.request_id,
                action_type = %meta.action_type,
                deadline_ms = deadline.as_millis() as u64,
                "handler deadline exceeded"
            );
            Decision {
                outcome: Outcome::Retry,
                response: Some(ProcessingResponse::failure(
                    ProcessingError::retryable(format!(
                        "processing exceeded deadline of {}ms",
                        deadline.as_millis()
                    )),
                    &meta,
                )),
            }
        }
    }
}
