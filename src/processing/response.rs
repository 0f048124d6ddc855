//! # Processing Result Types
//!
//! Every handler invocation produces one `ProcessingResponse` regardless of
//! business logic, so the processor can apply a single generic
//! ack/retry/bury rule. Errors carry an explicit retryable flag that drives
//! that decision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messaging::JobMeta;

/// Handler-level error with retryability classification.
///
/// Retryable errors (network faults, temporary outages) leave the message
/// eligible for redelivery; non-retryable ones (validation, business rule
/// violations) dead-letter it.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessingError {
    pub code: u16,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_details: Option<String>,
}

impl ProcessingError {
    /// Transient failure, worth redelivering.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            retryable: true,
            dev_details: None,
        }
    }

    /// Permanent failure, dead-letter the message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
            retryable: false,
            dev_details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.dev_details = Some(details.into());
        self
    }
}

impl From<serde_json::Error> for ProcessingError {
    fn from(err: serde_json::Error) -> Self {
        Self::fatal(format!("serialization failed: {err}"))
    }
}

/// Uniform outcome wrapper for one handler invocation (wire JSON:
/// `{"error":...,"result":...,"processed":...,"meta":...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResponse {
    pub error: Option<ProcessingError>,
    pub result: serde_json::Value,
    pub processed: bool,
    pub meta: serde_json::Value,
}

impl ProcessingResponse {
    pub fn success(result: serde_json::Value, meta: &JobMeta) -> Self {
        Self {
            error: None,
            result,
            processed: true,
            meta: serde_json::to_value(meta).unwrap_or_default(),
        }
    }

    pub fn failure(error: ProcessingError, meta: &JobMeta) -> Self {
        Self {
            error: Some(error),
            result: serde_json::Value::Null,
            processed: false,
            meta: serde_json::to_value(meta).unwrap_or_default(),
        }
    }
}
