//! # Manager
//!
//! Owns the process's workers: starts them together, shuts them down
//! together, and guarantees the shutdown sequence runs once no matter how
//! many signals arrive.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tracing::info;

use crate::error::Result;
use crate::worker::worker::Worker;

#[derive(Default)]
pub struct Manager {
    workers: Vec<Worker>,
    shutting_down: AtomicBool,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_worker(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Start every registered worker. Fails on the first worker that
    /// cannot start; already-started workers keep running and are taken
    /// down by the caller's shutdown path.
    pub fn start(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            worker.start()?;
        }
        info!(workers = self.workers.len(), "manager started");
        Ok(())
    }

    /// Drain and stop every worker, concurrently. Only the first call
    /// performs the shutdown; concurrent and repeated calls return once
    /// without touching the workers.
    pub async fn shutdown(&mut self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!(workers = self.workers.len(), "manager shutting down");
        join_all(self.workers.iter_mut().map(|w| w.shutdown())).await;
        info!("manager stopped");
    }
}
