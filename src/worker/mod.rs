//! Worker pool: polling subscribers, processing consumers, per-queue
//! workers, and the process-level manager that drains them on shutdown.

pub mod manager;
pub mod processor;
pub mod subscriber;
#[allow(clippy::module_inception)]
pub mod worker;

pub use manager::Manager;
pub use processor::Processor;
pub use subscriber::Subscriber;
pub use worker::{Worker, WorkerState};
