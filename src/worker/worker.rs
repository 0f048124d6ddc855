//! # Worker
//!
//! One queue binding wired end to end: subscriber pool, bounded handoff
//! channel, processor pool. Shutdown is a four-phase drain so every
//! message already pulled off the queue is either processed or returned
//! via its lease.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::WorkerConfig;
use crate::error::{CoreError, Result};
use crate::ids::RequestIdGenerator;
use crate::messaging::QueueDriver;
use crate::registry::HandlerRegistry;
use crate::worker::processor::Processor;
use crate::worker::subscriber::Subscriber;

/// Observable lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WorkerState::Created => "created",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

pub struct Worker {
    config: WorkerConfig,
    queue: Arc<dyn QueueDriver>,
    registry: Arc<HandlerRegistry>,
    ids: RequestIdGenerator,
    state: WorkerState,
    subscriber: Option<Subscriber>,
    processor: Option<Processor>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn QueueDriver>,
        registry: Arc<HandlerRegistry>,
        ids: RequestIdGenerator,
    ) -> Self {
        Self {
            config,
            queue,
            registry,
            ids,
            state: WorkerState::Created,
            subscriber: None,
            processor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Spawn both stages. Valid only from `Created`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != WorkerState::Created {
            return Err(CoreError::Worker(format!(
                "worker {} cannot start from state {}",
                self.config.name, self.state
            )));
        }

        // Sink before source: the consumers must exist before the pollers
        // can push into the channel.
        let (tx, rx) = mpsc::channel(self.config.processor.buffer_size);
        self.processor = Some(Processor::start(
            Arc::clone(&self.queue),
            self.config.queue_name.clone(),
            self.config.processor.clone(),
            Arc::clone(&self.registry),
            self.ids.clone(),
            rx,
        ));
        self.subscriber = Some(Subscriber::start(
            Arc::clone(&self.queue),
            self.config.queue_name.clone(),
            self.config.subscriber.clone(),
            tx,
        ));
        self.state = WorkerState::Running;
        info!(worker = %self.config.name, queue = %self.config.queue_name, "worker running");
        Ok(())
    }

    /// Graceful drain. Stops intake first, then waits for the processing
    /// stage to finish everything already buffered. Safe to call more than
    /// once; later calls are no-ops.
    pub async fn shutdown(&mut self) {
        if self.state != WorkerState::Running {
            return;
        }
        self.state = WorkerState::Draining;
        info!(worker = %self.config.name, "worker draining");

        // Phase 1-2: stop intake and wait for the pollers to exit, so no
        // new message enters the channel.
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.stop();
            subscriber.wait().await;
        }
        self.subscriber = None;

        // Phase 3-4: flip the consumers into drain mode and wait them out.
        if let Some(processor) = self.processor.as_mut() {
            processor.signal_shutdown();
            processor.wait().await;
        }
        self.processor = None;

        self.state = WorkerState::Stopped;
        info!(worker = %self.config.name, "worker stopped");
    }
}
