//! # Core Error Types
//!
//! Crate-level error enum for failures that abort startup or cross module
//! boundaries. Per-concern errors live next to their modules
//! (`messaging::MessagingError`, `processing::ProcessingError`, ...).

use thiserror::Error;

/// Top-level error type for the dispatch engine.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Queue error: {0}")]
    Queue(#[from] crate::messaging::MessagingError),

    #[error("Pub/sub error: {0}")]
    PubSub(#[from] crate::pubsub::PubSubError),

    #[error("Registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
