//! Idempotency gate.
//!
//! Processing state lives in the source object's tags: `updated=1` once the
//! object has been processed, `watermark=1` when a watermark was applied.
//! Keys compare exactly and only the value `"1"` counts as set.
//!
//! The gate is not transactional. Between [`IdempotencyGate::check`] and
//! [`IdempotencyGate::mark`] no lock is held, so two invocations racing on
//! the same source can both see it unprocessed, both run, and both mark it.
//! The last write wins and the duplicate work is wasted but harmless.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::storage::{ObjectLocator, ObjectStore, TagSet};

pub const TAG_UPDATED: &str = "updated";
pub const TAG_WATERMARK: &str = "watermark";
pub const TAG_SET: &str = "1";

/// Processing state of one source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingState {
    pub updated: bool,
    pub watermark_applied: bool,
}

impl ProcessingState {
    /// State written after a successful run.
    pub fn processed(watermark_applied: bool) -> Self {
        Self {
            updated: true,
            watermark_applied,
        }
    }

    pub fn from_tags(tags: &TagSet) -> Self {
        let is_set = |key: &str| tags.get(key) == Some(TAG_SET);
        Self {
            updated: is_set(TAG_UPDATED),
            watermark_applied: is_set(TAG_WATERMARK),
        }
    }

    /// Tags for the set flags. Unset flags produce no tag.
    pub fn to_tags(&self) -> TagSet {
        let mut tags = TagSet::new();
        if self.updated {
            tags.insert(TAG_UPDATED, TAG_SET);
        }
        if self.watermark_applied {
            tags.insert(TAG_WATERMARK, TAG_SET);
        }
        tags
    }
}

/// Reads and writes processing state through an object store.
#[derive(Clone)]
pub struct IdempotencyGate {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for IdempotencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyGate").finish_non_exhaustive()
    }
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Current tags of `source`.
    pub async fn read(&self, source: &ObjectLocator) -> Result<TagSet, PipelineError> {
        self.store.get_tags(source).await
    }

    pub async fn check(&self, source: &ObjectLocator) -> Result<ProcessingState, PipelineError> {
        let state = ProcessingState::from_tags(&self.read(source).await?);
        tracing::debug!(
            source = %source,
            updated = state.updated,
            watermark = state.watermark_applied,
            "Idempotency gate read"
        );
        Ok(state)
    }

    /// Merge `state` into the existing tags of `source` and write them back.
    pub async fn mark(
        &self,
        source: &ObjectLocator,
        state: ProcessingState,
    ) -> Result<TagSet, PipelineError> {
        let mut tags = self.read(source).await?;
        tags.merge(&state.to_tags());
        self.store.put_tags(source, &tags).await?;

        tracing::debug!(
            source = %source,
            updated = state.updated,
            watermark = state.watermark_applied,
            "Idempotency gate written"
        );
        Ok(tags)
    }
}
