//! # diagsync-core
//!
//! Job dispatch, consumption, and correlation engine bridging a
//! synchronous API tier to an asynchronous worker pool.
//!
//! The producer side publishes a job envelope to a queue and smart-waits
//! on a correlation channel for the result; the worker side runs a
//! subscriber/processor pool that routes each envelope to a registered
//! handler and maps the outcome onto ack, retry, or dead-letter. A
//! callback consumer closes the loop by persisting completions and
//! notifying waiters.
//!
//! Module map:
//! - [`messaging`] — queue port, job envelope codec, HTTP queue adapter
//! - [`pubsub`] — pub/sub port and the correlation channel convention
//! - [`registry`] — handler contract, three-phase pipeline, action routing
//! - [`processing`] — per-message pipeline and outcome mapping
//! - [`worker`] — subscriber/processor pool, worker lifecycle, manager
//! - [`dispatch`] — producer-side dispatch, smart wait, callback consumer
//! - [`handlers`] — built-in order diagnosis handler

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod messaging;
pub mod processing;
pub mod pubsub;
pub mod registry;
pub mod shutdown;
pub mod worker;

pub use error::{CoreError, Result};
