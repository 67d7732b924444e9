// Transformation pipeline: grammar, parameter binding, idempotency gate and executor

pub mod executor;
pub mod gate;
pub mod params;
pub mod parser;

use std::time::Instant;
use uuid::Uuid;

use crate::storage::ObjectLocator;

pub use executor::{
    ExecutorState, NoopObserver, Outcome, PipelineExecutor, StageCounter, StageObserver,
    StageRecord,
};
pub use gate::{IdempotencyGate, ProcessingState};
pub use params::Params;
pub use parser::{Operation, OperationKind, Pipeline};

/// Identity of one invocation as it flows through the pipeline
#[derive(Debug, Clone)]
pub struct InvocationContext {
    request_id: String,
    source: ObjectLocator,
    target: ObjectLocator,
    started: Instant,
}

impl InvocationContext {
    /// Create a context with a fresh request ID (UUID v4)
    pub fn new(source: ObjectLocator, target: ObjectLocator) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            source,
            target,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn source(&self) -> &ObjectLocator {
        &self.source
    }

    pub fn target(&self) -> &ObjectLocator {
        &self.target
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Span that every log line of this invocation is recorded in
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "invocation",
            request_id = %self.request_id,
            source_bucket = %self.source.bucket,
            source_key = %self.source.key,
            target_bucket = %self.target.bucket,
            target_key = %self.target.key,
        )
    }
}
