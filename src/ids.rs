//! Request identifier generation.
//!
//! Explicitly constructed and injected wherever request ids are synthesized;
//! there is no process-wide generator. Ids are used for tracing only, never
//! for deduplication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Generator combining a per-instance uuid prefix with a monotonic counter,
/// so ids stay unique across instances and ordered within one.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    node: Arc<str>,
    counter: Arc<AtomicU64>,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            node: Arc::from(Uuid::new_v4().simple().to_string().as_str()),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:08x}", self.node, seq)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
