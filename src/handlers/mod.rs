//! Built-in job handlers and the registry wiring for a worker process.

pub mod anomaly;
pub mod diagnose;
pub mod shipping;

use std::sync::Arc;

use crate::error::Result;
use crate::messaging::{JobMeta, QueueDriver};
use crate::registry::{HandlerFactory, HandlerRegistry, JobHandler};

pub use diagnose::{DiagnoseHandler, DiagnoseInput};

/// Routing key for the order diagnosis job.
pub const ACTION_ORDER_DIAGNOSE: &str = "order_diagnose";

/// Build the registry for a worker bound to `callback_queue`.
pub fn build_registry(
    queue: Arc<dyn QueueDriver>,
    callback_queue: String,
) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();

    let factory: HandlerFactory = Arc::new(move |meta: &JobMeta, payload| {
        let handler = DiagnoseHandler::from_payload(
            meta,
            payload,
            Arc::clone(&queue),
            callback_queue.clone(),
        )?;
        Ok(Box::new(handler) as Box<dyn JobHandler>)
    });
    registry.register(ACTION_ORDER_DIAGNOSE, factory)?;

    Ok(registry)
}
