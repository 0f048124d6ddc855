//! # Order Diagnose Handler
//!
//! The one built-in handler: rates the order's shipping options, runs
//! anomaly detection, and emits a completion callback onto the callback
//! queue for the producer side to pick up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::dispatch::{CallbackMessage, CallbackStatus};
use crate::handlers::{anomaly, shipping};
use crate::messaging::{JobMeta, QueueDriver};
use crate::processing::ProcessingError;
use crate::registry::{HandlerContext, JobHandler};

/// Business payload carried in the envelope's opaque `data` field.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnoseInput {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub account_id: i64,
    #[serde(default)]
    pub merchant_order_no: String,
    #[serde(default)]
    pub shipment: Value,
}

pub struct DiagnoseHandler {
    meta: JobMeta,
    input: DiagnoseInput,
    queue: Arc<dyn QueueDriver>,
    callback_queue: String,
    result: Option<Value>,
}

impl DiagnoseHandler {
    /// Deserialize the business payload. Shape errors here surface as
    /// construction failures, before any phase runs.
    pub fn from_payload(
        meta: &JobMeta,
        payload: Value,
        queue: Arc<dyn QueueDriver>,
        callback_queue: String,
    ) -> Result<Self, ProcessingError> {
        let input: DiagnoseInput = serde_json::from_value(payload)
            .map_err(|e| ProcessingError::fatal(format!("unmarshal business data failed: {e}")))?;
        Ok(Self {
            meta: meta.clone(),
            input,
            queue,
            callback_queue,
            result: None,
        })
    }
}

#[async_trait]
impl JobHandler for DiagnoseHandler {
    async fn pre_process(&mut self, _ctx: &HandlerContext) -> Result<(), ProcessingError> {
        if self.input.order_id.is_empty() {
            return Err(ProcessingError::fatal("order_id is required"));
        }
        if self.input.account_id == 0 {
            return Err(ProcessingError::fatal("account_id is required"));
        }
        Ok(())
    }

    async fn process(&mut self, ctx: &HandlerContext) -> Result<(), ProcessingError> {
        debug!(
            request_id = %ctx.request_id,
            order_id = %self.input.order_id,
            "running order diagnosis"
        );

        let shipping_result = shipping::calculate_rates(&self.input.order_id);
        let anomaly_result = anomaly::check_shipment(&self.input.shipment);

        self.result = Some(json!({
            "items": [
                {
                    "type": "shipping",
                    "status": "SUCCESS",
                    "data_json": serde_json::to_value(&shipping_result)
                        .map_err(ProcessingError::from)?,
                },
                {
                    "type": "anomaly",
                    "status": "SUCCESS",
                    "data_json": serde_json::to_value(&anomaly_result)
                        .map_err(ProcessingError::from)?,
                },
            ]
        }));
        Ok(())
    }

    async fn post_process(&mut self, ctx: &HandlerContext) -> Result<(), ProcessingError> {
        let callback = CallbackMessage {
            request_id: self.meta.request_id.clone(),
            order_id: self.input.order_id.clone(),
            account_id: self.input.account_id,
            status: CallbackStatus::Success,
            diagnosis_result: self.result.clone(),
            error: String::new(),
            processed_at: Utc::now().timestamp(),
        };
        let bytes = serde_json::to_vec(&callback)
            .map_err(|e| ProcessingError::fatal(format!("failed to marshal callback: {e}")))?;

        // ttl=0 never expires, delay=0 immediately consumable. A transport
        // failure is retryable; redelivery re-runs the whole diagnosis.
        self.queue
            .publish(&self.callback_queue, &bytes, Duration::ZERO, Duration::ZERO)
            .await
            .map_err(|e| {
                ProcessingError::retryable(format!("failed to publish callback: {e}"))
            })?;

        info!(
            request_id = %ctx.request_id,
            order_id = %self.input.order_id,
            callback_queue = %self.callback_queue,
            "diagnosis completed, callback sent"
        );
        Ok(())
    }

    fn output(&self) -> Value {
        self.result.clone().unwrap_or(Value::Null)
    }
}
