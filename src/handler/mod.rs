//! Invocation handler.
//!
//! Accepts an HTTP proxy style event, runs the pipeline it describes and maps
//! the result to a status code plus a short JSON message:
//!
//! ```json
//! {
//!   "httpMethod": "POST",
//!   "queryStringParameters": { "x-s3-process": "image/resize,w_300,h_300" },
//!   "body": "{\"origin-bucket\": \"photos\", \"origin-key\": \"cat.jpg\"}"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::Instrument;

use crate::error::PipelineError;
use crate::metrics::{PipelineMetrics, OUTCOME_REJECTED};
use crate::pipeline::{InvocationContext, Outcome, Pipeline, PipelineExecutor};
use crate::storage::ObjectLocator;

/// Query parameter carrying the operation string
pub const PROCESS_PARAM: &str = "x-s3-process";

/// Incoming invocation event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// JSON-encoded [`ProcessRequest`]
    #[serde(default)]
    pub body: Option<String>,
}

impl InvocationEvent {
    /// Build an event for `request` and operation string `ops`.
    pub fn new(request: &ProcessRequest, ops: &str) -> Result<Self, PipelineError> {
        let body = serde_json::to_string(request)
            .map_err(|e| PipelineError::invalid_request(e.to_string()))?;
        Ok(Self {
            http_method: Some("POST".to_string()),
            headers: None,
            query_string_parameters: Some(HashMap::from([(
                PROCESS_PARAM.to_string(),
                ops.to_string(),
            )])),
            body: Some(body),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::invalid_request(format!("event is not valid JSON: {}", e)))
    }

    pub fn process_request(&self) -> Result<ProcessRequest, PipelineError> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| PipelineError::invalid_request("event has no body"))?;
        ProcessRequest::from_json(body)
    }

    pub fn operations(&self) -> Result<&str, PipelineError> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(PROCESS_PARAM))
            .map(String::as_str)
            .ok_or_else(|| {
                PipelineError::invalid_request(format!("missing '{}' parameter", PROCESS_PARAM))
            })
    }
}

/// Decoded event body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(rename = "origin-bucket")]
    pub origin_bucket: String,
    #[serde(rename = "origin-key")]
    pub origin_key: String,
    #[serde(rename = "target-bucket", default, skip_serializing_if = "Option::is_none")]
    pub target_bucket: Option<String>,
    #[serde(rename = "target-key", default, skip_serializing_if = "Option::is_none")]
    pub target_key: Option<String>,
}

impl ProcessRequest {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let request: Self = serde_json::from_str(json)
            .map_err(|e| PipelineError::invalid_request(format!("invalid body: {}", e)))?;
        if request.origin_bucket.is_empty() || request.origin_key.is_empty() {
            return Err(PipelineError::invalid_request(
                "origin-bucket and origin-key must be non-empty",
            ));
        }
        Ok(request)
    }

    pub fn source(&self) -> ObjectLocator {
        ObjectLocator::new(&self.origin_bucket, &self.origin_key)
    }

    /// Target locator. Each field falls back to its origin counterpart.
    pub fn target(&self) -> ObjectLocator {
        ObjectLocator::new(
            self.target_bucket.as_deref().unwrap_or(&self.origin_bucket),
            self.target_key.as_deref().unwrap_or(&self.origin_key),
        )
    }
}

/// Invocation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON `{"message": ...}`
    pub body: String,
}

#[derive(Serialize, Deserialize)]
struct MessageBody<'a> {
    message: &'a str,
}

impl InvocationResult {
    pub fn new(status_code: u16, message: &str) -> Self {
        let body = serde_json::to_string(&MessageBody { message })
            .unwrap_or_else(|_| String::from("{}"));
        Self { status_code, body }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn from_error(error: &PipelineError) -> Self {
        Self::new(error.status_code(), error.public_message())
    }

    /// The `message` field of the body, if it parses.
    pub fn message(&self) -> Option<String> {
        serde_json::from_str::<MessageBody<'_>>(&self.body)
            .ok()
            .map(|body| body.message.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// `Err` with the status and message for a non-2xx result.
    pub fn into_result(self) -> Result<Self, String> {
        if self.is_success() {
            return Ok(self);
        }
        Err(format!(
            "invocation failed with status {}: {}",
            self.status_code,
            self.message().unwrap_or_else(|| self.body.clone())
        ))
    }
}

/// Runs invocation events through the pipeline executor
#[derive(Debug, Clone)]
pub struct Handler {
    executor: PipelineExecutor,
}

impl Handler {
    pub fn new(executor: PipelineExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub async fn handle(&self, event: &InvocationEvent) -> InvocationResult {
        match self.process(event).await {
            Ok(_) => InvocationResult::ok(),
            Err(e) => InvocationResult::from_error(&e),
        }
    }

    /// Like [`Handler::handle`], but returns the outcome itself.
    pub async fn process(&self, event: &InvocationEvent) -> Result<Outcome, PipelineError> {
        let request = event.process_request().map_err(reject)?;
        let ops = event.operations().map_err(reject)?;

        let context = InvocationContext::new(request.source(), request.target());
        let span = context.span();

        async {
            let pipeline = Pipeline::parse(ops).map_err(reject)?;
            tracing::info!(
                method = event.http_method.as_deref().unwrap_or("-"),
                operations = pipeline.len(),
                "Invocation started"
            );

            let result = self
                .executor
                .run(context.source(), context.target(), &pipeline)
                .await;

            match &result {
                Ok(Outcome::AlreadyProcessed) => tracing::info!(
                    elapsed_ms = context.elapsed_ms(),
                    status = 200,
                    "Invocation skipped, source already processed"
                ),
                Ok(_) => tracing::info!(
                    elapsed_ms = context.elapsed_ms(),
                    status = 200,
                    "Invocation completed"
                ),
                Err(e) if e.is_client_error() => tracing::warn!(
                    elapsed_ms = context.elapsed_ms(),
                    status = e.status_code(),
                    error_kind = e.kind(),
                    error = %e,
                    "Invocation rejected"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = context.elapsed_ms(),
                    status = e.status_code(),
                    error_kind = e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Invocation failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Count an envelope or grammar error that never reaches the executor.
fn reject(error: PipelineError) -> PipelineError {
    tracing::warn!(error_kind = error.kind(), error = %error, "Invocation rejected");
    PipelineMetrics::global().record_invocation(OUTCOME_REJECTED);
    error
}
