//! # Handler Contract
//!
//! Every job handler runs a three-phase pipeline: `pre_process` for
//! structural and business precondition checks, `process` for the actual
//! computation, and `post_process` for side effects such as sending the
//! callback. Phases run strictly in order and the pipeline aborts on the
//! first failure, reporting which phase failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::processing::response::ProcessingError;

/// Request-scoped context passed explicitly through every pipeline phase.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub request_id: String,
    pub worker_id: usize,
    pub started_at: DateTime<Utc>,
}

impl HandlerContext {
    pub fn new(request_id: String, worker_id: usize) -> Self {
        Self {
            request_id,
            worker_id,
            started_at: Utc::now(),
        }
    }
}

/// Pipeline phase names, carried on pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    PreProcess,
    Process,
    PostProcess,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::PreProcess => write!(f, "pre_process"),
            PipelinePhase::Process => write!(f, "process"),
            PipelinePhase::PostProcess => write!(f, "post_process"),
        }
    }
}

/// A phase failure with its position in the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub phase: PipelinePhase,
    pub error: ProcessingError,
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)
    }
}

/// Uniform processing contract implemented by every routed handler.
#[async_trait]
pub trait JobHandler: Send {
    async fn pre_process(&mut self, ctx: &HandlerContext) -> Result<(), ProcessingError>;

    async fn process(&mut self, ctx: &HandlerContext) -> Result<(), ProcessingError>;

    async fn post_process(&mut self, ctx: &HandlerContext) -> Result<(), ProcessingError>;

    /// Final output after a successful pipeline, serialized into the
    /// processing response.
    fn output(&self) -> serde_json::Value;
}

/// Drive the three phases in order, stopping at the first failure.
pub async fn run_pipeline(
    handler: &mut dyn JobHandler,
    ctx: &HandlerContext,
) -> Result<(), PipelineFailure> {
    handler
        .pre_process(ctx)
        .await
        .map_err(|error| PipelineFailure {
            phase: PipelinePhase::PreProcess,
            error,
        })?;
    handler.process(ctx).await.map_err(|error| PipelineFailure {
        phase: PipelinePhase::Process,
        error,
    })?;
    handler
        .post_process(ctx)
        .await
        .map_err(|error| PipelineFailure {
            phase: PipelinePhase::PostProcess,
            error,
        })?;
    Ok(())
}
