//! # Messaging Error Types
//!
//! Structured errors for the queue port, using thiserror instead of
//! `Box<dyn Error>` patterns.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Unexpected status {status} from queue service: {operation} on {queue_name}")]
    UnexpectedStatus {
        queue_name: String,
        operation: String,
        status: u16,
    },

    #[error("Message decode error: {message}")]
    MessageDecode { message: String },

    #[error("Envelope parse error: {message}")]
    EnvelopeParse { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::MessageDecode {
            message: message.into(),
        }
    }
}
