//! Message-level processing: the uniform response shape and the
//! parse/route/invoke pipeline that maps each message to a queue decision.

pub mod dispatch;
pub mod response;

pub use dispatch::{process_message, Decision, Outcome};
pub use response::{ProcessingError, ProcessingResponse};
