//! Upload trigger.
//!
//! Reacts to an upload notification by consulting the idempotency gate and,
//! for objects not yet processed, calling the processing endpoint. Two event
//! shapes are accepted: a JSON body carrying `origin-bucket`/`origin-key`, or
//! a storage event with a `Records` list.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TriggerConfig;
use crate::error::PipelineError;
use crate::handler::ProcessRequest;
use crate::pipeline::IdempotencyGate;
use crate::storage::ObjectLocator;

/// Tells the processing endpoint that `source` needs processing.
#[async_trait]
pub trait ProcessNotifier: Send + Sync {
    async fn notify(&self, source: &ObjectLocator) -> Result<(), PipelineError>;
}

/// Notifier that issues `GET api_url?bucket=..&key=..`
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    api_url: String,
}

impl HttpNotifier {
    pub fn new(config: &TriggerConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::storage("notify", e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl ProcessNotifier for HttpNotifier {
    async fn notify(&self, source: &ObjectLocator) -> Result<(), PipelineError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("bucket", source.bucket.as_str()), ("key", source.key.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::storage("notify", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::storage(
                "notify",
                format!("processing endpoint returned {}", status),
            ));
        }

        tracing::debug!(source = %source, status = status.as_u16(), "Processing endpoint notified");
        Ok(())
    }
}

/// Upload notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadEvent {
    /// JSON-encoded [`ProcessRequest`]
    #[serde(default)]
    pub body: Option<String>,
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    /// URL-encoded, with spaces as `+`
    pub key: String,
}

impl UploadEvent {
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::invalid_request(format!("event is not valid JSON: {}", e)))
    }

    /// Objects named by this event, records first, then the body.
    pub fn sources(&self) -> Result<Vec<ObjectLocator>, PipelineError> {
        let mut sources = self
            .records
            .iter()
            .map(|record| {
                let key = decode_key(&record.s3.object.key)?;
                Ok(ObjectLocator::new(&record.s3.bucket.name, key))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        if let Some(body) = &self.body {
            sources.push(ProcessRequest::from_json(body)?.source());
        }

        if sources.is_empty() {
            return Err(PipelineError::invalid_request(
                "event names no object: expected a body or Records",
            ));
        }
        Ok(sources)
    }
}

fn decode_key(raw: &str) -> Result<String, PipelineError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::invalid_request(format!("undecodable object key: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Already tagged as processed
    Skipped(ObjectLocator),
    Notified(ObjectLocator),
}

/// Gate-then-notify trigger
#[derive(Clone)]
pub struct UploadTrigger {
    gate: IdempotencyGate,
    notifier: Arc<dyn ProcessNotifier>,
}

impl std::fmt::Debug for UploadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTrigger")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl UploadTrigger {
    pub fn new(gate: IdempotencyGate, notifier: Arc<dyn ProcessNotifier>) -> Self {
        Self { gate, notifier }
    }

    /// Handle every object in `event`, stopping at the first error.
    pub async fn handle(&self, event: &UploadEvent) -> Result<Vec<TriggerOutcome>, PipelineError> {
        let mut outcomes = Vec::new();
        for source in event.sources()? {
            let state = self.gate.check(&source).await?;
            if state.updated {
                tracing::info!(source = %source, "Upload already processed, skipping");
                outcomes.push(TriggerOutcome::Skipped(source));
                continue;
            }

            self.notifier.notify(&source).await?;
            tracing::info!(source = %source, "Upload sent for processing");
            outcomes.push(TriggerOutcome::Notified(source));
        }
        Ok(outcomes)
    }
}
