//! # Message Structures and the Job Envelope Codec
//!
//! `TransportMessage` is the ephemeral unit handed between queue, subscriber
//! and processor; `JobEnvelope` is the standardized wire shape wrapping
//! routing metadata and an opaque business payload:
//!
//! ```json
//! {"payload":{"data":{"request_id":"...","org_id":"...","action_type":"...","id":"...","data":{}}}}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::RequestIdGenerator;
use crate::messaging::errors::MessagingError;

/// Message pulled from a queue, owned by exactly one loop at a time: the
/// poller that fetched it until handoff, then the consumer that dequeued it
/// until an ack/retry/bury decision is made.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Queue-assigned job id.
    pub id: String,
    /// Queue the message was consumed from.
    pub queue: String,
    /// Raw job bytes.
    pub data: Vec<u8>,
    /// Delivery attempts remaining, when the queue reports them.
    pub attempts: Option<u32>,
}

/// Top-level job envelope as published to the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub payload: JobPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub data: JobPayloadData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayloadData {
    /// Request id for tracing. Synthesized at parse time when absent; never
    /// used for deduplication.
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub org_id: String,
    /// Routing key selecting the handler.
    pub action_type: String,
    /// Business entity id (e.g. order id).
    pub id: String,
    /// Opaque handler-defined payload.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Routing metadata extracted from an envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobMeta {
    pub request_id: String,
    pub org_id: String,
    pub action_type: String,
    pub business_id: String,
}

impl JobEnvelope {
    /// Build an envelope for publishing.
    pub fn new(
        request_id: String,
        org_id: String,
        action_type: String,
        business_id: String,
        data: serde_json::Value,
    ) -> Self {
        Self {
            payload: JobPayload {
                data: JobPayloadData {
                    request_id,
                    org_id,
                    action_type,
                    id: business_id,
                    data,
                    metadata: HashMap::new(),
                },
            },
        }
    }

    pub fn meta(&self) -> JobMeta {
        let data = &self.payload.data;
        JobMeta {
            request_id: data.request_id.clone(),
            org_id: data.org_id.clone(),
            action_type: data.action_type.clone(),
            business_id: data.id.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::Internal {
            message: format!("envelope serialization failed: {e}"),
        })
    }
}

/// Parse raw queue bytes into an envelope, synthesizing a request id from
/// the injected generator when the publisher omitted one.
///
/// A malformed or structurally absent envelope is a parse error; the caller
/// dead-letters without constructing a handler.
pub fn parse_envelope(
    raw: &[u8],
    ids: &RequestIdGenerator,
) -> Result<(JobEnvelope, JobMeta, serde_json::Value), MessagingError> {
    let mut envelope: JobEnvelope =
        serde_json::from_slice(raw).map_err(|e| MessagingError::EnvelopeParse {
            message: format!("json unmarshal failed: {e}"),
        })?;

    let data = &mut envelope.payload.data;
    if data.action_type.is_empty() {
        return Err(MessagingError::EnvelopeParse {
            message: "action_type is required".to_string(),
        });
    }
    if data.request_id.is_empty() {
        data.request_id = ids.next_id();
    }

    let biz_payload = data.data.clone();
    let meta = envelope.meta();
    Ok((envelope, meta, biz_payload))
}
