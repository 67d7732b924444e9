//! Pipeline executor.
//!
//! Runs one parsed pipeline against one source object:
//!
//! ```text
//! Idle -> Loaded -> Running -> Finalized
//!           |          |-----> Rejected   (client input: unknown op, bad parameter)
//!           |          `-----> Failed     (storage, decode, render, encode)
//!           `----------------> Finalized  (already processed, nothing runs)
//! ```
//!
//! Operations run strictly in parse order. The first error aborts the run;
//! nothing is uploaded and the idempotency gate is not written, so a failed
//! source stays eligible for a later retry. There are no retries here.
//!
//! One partial state exists. With a separate target, the target is uploaded
//! already tagged `updated=1` before the source is marked. If marking the
//! source then fails, the run ends `Failed` with the output delivered and the
//! source still unmarked; a retry reprocesses the source and overwrites the
//! same target.

use bytes::Bytes;
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::gate::{IdempotencyGate, ProcessingState};
use super::params::Params;
use super::parser::{OperationKind, Pipeline};
use crate::config::LimitsConfig;
use crate::error::PipelineError;
use crate::metrics::{
    PipelineMetrics, OUTCOME_FAILED, OUTCOME_PROCESSED, OUTCOME_REJECTED, OUTCOME_SKIPPED,
};
use crate::storage::{ObjectLocator, ObjectStore};
use crate::transform::{
    decode_image, encode, resize_rgba, target_dimensions, OutputFormat, Quality, ResizeOptions,
};
use crate::watermark::{WatermarkProcessor, WatermarkSpec};

/// Executor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Loaded,
    Running,
    Finalized,
    Rejected,
    Failed,
}

impl ExecutorState {
    pub fn can_transition_to(&self, next: ExecutorState) -> bool {
        use ExecutorState::*;
        matches!(
            (self, next),
            (Idle, Loaded)
                | (Idle, Failed)
                | (Loaded, Running)
                | (Loaded, Finalized)
                | (Loaded, Failed)
                | (Running, Finalized)
                | (Running, Rejected)
                | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutorState::Finalized | ExecutorState::Rejected | ExecutorState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Loaded => "loaded",
            ExecutorState::Running => "running",
            ExecutorState::Finalized => "finalized",
            ExecutorState::Rejected => "rejected",
            ExecutorState::Failed => "failed",
        }
    }

    /// Terminal state a run ends in when it fails with `error`.
    pub fn for_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::MalformedPipeline { .. }
            | PipelineError::MalformedParameter { .. }
            | PipelineError::UnknownOperation { .. }
            | PipelineError::InvalidDimensions { .. }
            | PipelineError::InvalidRequest { .. } => ExecutorState::Rejected,
            _ => ExecutorState::Failed,
        }
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hooks into a run, called synchronously.
pub trait StageObserver: Send + Sync {
    /// Called after each operation stage with the canvas size it produced.
    fn on_stage(&self, operation: &str, width: u32, height: u32);

    fn on_transition(&self, _from: ExecutorState, _to: ExecutorState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&self, _operation: &str, _width: u32, _height: u32) {}
}

/// One observed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub operation: String,
    pub width: u32,
    pub height: u32,
}

/// Observer that records every stage and transition.
#[derive(Debug, Default)]
pub struct StageCounter {
    stages: Mutex<Vec<StageRecord>>,
    transitions: Mutex<Vec<ExecutorState>>,
}

impl StageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.stages.lock().len()
    }

    pub fn stages(&self) -> Vec<StageRecord> {
        self.stages.lock().clone()
    }

    /// States entered, in order.
    pub fn transitions(&self) -> Vec<ExecutorState> {
        self.transitions.lock().clone()
    }

    pub fn final_state(&self) -> Option<ExecutorState> {
        self.transitions.lock().last().copied()
    }
}

impl StageObserver for StageCounter {
    fn on_stage(&self, operation: &str, width: u32, height: u32) {
        self.stages.lock().push(StageRecord {
            operation: operation.to_string(),
            width,
            height,
        });
    }

    fn on_transition(&self, _from: ExecutorState, to: ExecutorState) {
        self.transitions.lock().push(to);
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The source was already processed. No stage ran and nothing was written.
    AlreadyProcessed,
    Processed {
        target: ObjectLocator,
        content_type: &'static str,
        bytes: Bytes,
        state: ProcessingState,
    },
}

impl Outcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Outcome::Processed { .. })
    }
}

struct StateMachine<'a> {
    state: ExecutorState,
    observer: &'a dyn StageObserver,
}

impl<'a> StateMachine<'a> {
    fn new(observer: &'a dyn StageObserver) -> Self {
        Self {
            state: ExecutorState::Idle,
            observer,
        }
    }

    fn advance(&mut self, next: ExecutorState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal executor transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Executor transition");
        self.observer.on_transition(self.state, next);
        self.state = next;
    }

    /// Move to the terminal state matching `error` and hand it back.
    fn fail(&mut self, error: PipelineError) -> PipelineError {
        self.advance(ExecutorState::for_error(&error));
        error
    }
}

/// Runs pipelines against objects in one store.
#[derive(Clone)]
pub struct PipelineExecutor {
    store: Arc<dyn ObjectStore>,
    gate: IdempotencyGate,
    watermarks: WatermarkProcessor,
    limits: LimitsConfig,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("watermarks", &self.watermarks)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, watermarks: WatermarkProcessor) -> Self {
        Self {
            gate: IdempotencyGate::new(store.clone()),
            store,
            watermarks,
            limits: LimitsConfig::default(),
        }
    }

    /// Replace the default output size limits for resize and text watermarks.
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.watermarks = self.watermarks.with_limits(limits);
        self.limits = limits;
        self
    }

    pub fn gate(&self) -> &IdempotencyGate {
        &self.gate
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn run(
        &self,
        source: &ObjectLocator,
        target: &ObjectLocator,
        pipeline: &Pipeline,
    ) -> Result<Outcome, PipelineError> {
        self.run_observed(source, target, pipeline, &NoopObserver)
            .await
    }

    /// Run `pipeline` on `source`, writing the result to `target`.
    pub async fn run_observed(
        &self,
        source: &ObjectLocator,
        target: &ObjectLocator,
        pipeline: &Pipeline,
        observer: &dyn StageObserver,
    ) -> Result<Outcome, PipelineError> {
        let mut machine = StateMachine::new(observer);
        let result = self
            .execute(&mut machine, source, target, pipeline, observer)
            .await;

        let outcome_label = match (&result, machine.state) {
            (Ok(Outcome::AlreadyProcessed), _) => OUTCOME_SKIPPED,
            (Ok(_), _) => OUTCOME_PROCESSED,
            (Err(_), ExecutorState::Rejected) => OUTCOME_REJECTED,
            (Err(_), _) => OUTCOME_FAILED,
        };
        PipelineMetrics::global().record_invocation(outcome_label);

        result
    }

    async fn execute(
        &self,
        machine: &mut StateMachine<'_>,
        source: &ObjectLocator,
        target: &ObjectLocator,
        pipeline: &Pipeline,
        observer: &dyn StageObserver,
    ) -> Result<Outcome, PipelineError> {
        let metrics = PipelineMetrics::global();

        // Idle -> Loaded
        let started = Instant::now();
        let decoded = match self.store.get_object(source).await {
            Ok(bytes) => decode_image(&bytes),
            Err(e) => Err(e),
        }
        .map_err(|e| machine.fail(e))?;
        metrics.observe_stage("load", started.elapsed().as_secs_f64());
        machine.advance(ExecutorState::Loaded);

        tracing::info!(
            source = %source,
            width = decoded.pixels.width(),
            height = decoded.pixels.height(),
            format = ?decoded.format,
            "Source image loaded"
        );

        let source_tags = self.gate.read(source).await.map_err(|e| machine.fail(e))?;
        if ProcessingState::from_tags(&source_tags).updated {
            tracing::info!(source = %source, "Source already processed, skipping");
            machine.advance(ExecutorState::Finalized);
            return Ok(Outcome::AlreadyProcessed);
        }

        // Loaded -> Running
        machine.advance(ExecutorState::Running);
        let (canvas, quality, watermark_applied) = self
            .apply_operations(pipeline, decoded.pixels, observer)
            .await
            .map_err(|e| machine.fail(e))?;

        // Running -> Finalized
        let format = OutputFormat::resolve(&target.key, Some(decoded.format));
        let started = Instant::now();
        let bytes = encode(&canvas, format, quality).map_err(|e| machine.fail(e))?;
        metrics.observe_stage("encode", started.elapsed().as_secs_f64());

        let state = ProcessingState::processed(watermark_applied);
        let mut tags = if target == source {
            source_tags
        } else {
            Default::default()
        };
        tags.merge(&state.to_tags());

        let bytes = Bytes::from(bytes);
        let started = Instant::now();
        self.store
            .put_object(target, bytes.clone(), format.content_type(), &tags)
            .await
            .map_err(|e| machine.fail(e))?;
        if target != source {
            if let Err(e) = self.gate.mark(source, state).await {
                tracing::error!(
                    source = %source,
                    target = %target,
                    error = %e,
                    "Target delivered but source could not be marked processed"
                );
                return Err(machine.fail(e));
            }
        }
        metrics.observe_stage("upload", started.elapsed().as_secs_f64());

        tracing::info!(
            target = %target,
            format = %format,
            quality = quality.value(),
            size = bytes.len(),
            watermark = watermark_applied,
            "Processed image uploaded"
        );
        machine.advance(ExecutorState::Finalized);

        Ok(Outcome::Processed {
            target: target.clone(),
            content_type: format.content_type(),
            bytes,
            state,
        })
    }

    /// Apply every operation in order. Returns the canvas, the accumulated
    /// quality and whether a watermark ran.
    async fn apply_operations(
        &self,
        pipeline: &Pipeline,
        mut canvas: RgbaImage,
        observer: &dyn StageObserver,
    ) -> Result<(RgbaImage, Quality, bool), PipelineError> {
        let metrics = PipelineMetrics::global();
        let mut quality = Quality::default();
        let mut watermark_applied = false;

        for operation in pipeline {
            let started = Instant::now();

            match operation.kind() {
                OperationKind::Resize => {
                    let options = ResizeOptions::from_params(Params::new(operation))?;
                    let (width, height) =
                        target_dimensions(canvas.width(), canvas.height(), &options)?;
                    self.limits.check_dimensions(width as u64, height as u64)?;
                    canvas = resize_rgba(&canvas, width, height)?;
                }
                OperationKind::Watermark => {
                    let spec = WatermarkSpec::from_operation(operation)?;
                    canvas = self
                        .watermarks
                        .apply(&canvas, &spec, self.store.as_ref())
                        .await?;
                    watermark_applied = true;
                }
                OperationKind::Quality => {
                    quality.apply(Params::new(operation))?;
                }
                OperationKind::Unknown(name) => {
                    tracing::warn!(operation = %name, "Unknown operation, rejecting pipeline");
                    return Err(PipelineError::UnknownOperation { name });
                }
            }

            let elapsed = started.elapsed();
            metrics.observe_stage(operation.kind().as_label(), elapsed.as_secs_f64());
            observer.on_stage(operation.name(), canvas.width(), canvas.height());

            tracing::debug!(
                operation = operation.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                width = canvas.width(),
                height = canvas.height(),
                quality = quality.value(),
                "Stage complete"
            );
        }

        Ok((canvas, quality, watermark_applied))
    }
}
