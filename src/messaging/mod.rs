//! Queue port, message structures, and the job envelope codec.

pub mod errors;
pub mod lmstfy;
pub mod memory;
pub mod message;
pub mod queue;

pub use errors::MessagingError;
pub use lmstfy::LmstfyClient;
pub use memory::InMemoryQueue;
pub use message::{parse_envelope, JobEnvelope, JobMeta, JobPayload, JobPayloadData, TransportMessage};
pub use queue::QueueDriver;
