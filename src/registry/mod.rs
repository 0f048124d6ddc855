//! Action-type routing: the handler contract and the closed registry.

pub mod handler;
pub mod handler_registry;

pub use handler::{run_pipeline, HandlerContext, JobHandler, PipelineFailure, PipelinePhase};
pub use handler_registry::{HandlerFactory, HandlerRegistry, RegistryError};
