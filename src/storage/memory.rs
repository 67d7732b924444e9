//! In-memory object store
//!
//! Backs tests, benches and `--dry-run`. Every write is recorded so callers
//! can assert exactly what would have reached the bucket, and individual
//! operations can be forced to fail.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};

use super::{ObjectLocator, ObjectStore, TagSet};
use crate::error::PipelineError;

/// A stored object with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub tags: TagSet,
}

/// One recorded `put_object` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub locator: ObjectLocator,
    pub content_type: String,
    pub size: usize,
    pub tags: TagSet,
}

/// Storage operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetObject,
    PutObject,
    GetTags,
    PutTags,
}

impl StoreOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::GetObject => "get_object",
            StoreOperation::PutObject => "put_object",
            StoreOperation::GetTags => "get_tags",
            StoreOperation::PutTags => "put_tags",
        }
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocator, StoredObject>>,
    puts: Mutex<Vec<PutRecord>>,
    tag_writes: Mutex<Vec<(ObjectLocator, TagSet)>>,
    get_object_calls: Mutex<Vec<ObjectLocator>>,
    failing: RwLock<HashSet<StoreOperation>>,
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore")
            .field("objects", &self.objects.read().len())
            .field("puts", &self.puts.lock().len())
            .finish()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a put.
    pub fn insert(&self, locator: ObjectLocator, body: impl Into<Bytes>, tags: TagSet) {
        self.objects.write().insert(
            locator,
            StoredObject {
                body: body.into(),
                content_type: "application/octet-stream".to_string(),
                tags,
            },
        );
    }

    pub fn object(&self, locator: &ObjectLocator) -> Option<StoredObject> {
        self.objects.read().get(locator).cloned()
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.puts.lock().clone()
    }

    pub fn tag_writes(&self) -> Vec<(ObjectLocator, TagSet)> {
        self.tag_writes.lock().clone()
    }

    /// Number of `get_object` calls made for `locator`.
    pub fn get_object_count(&self, locator: &ObjectLocator) -> usize {
        self.get_object_calls
            .lock()
            .iter()
            .filter(|l| *l == locator)
            .count()
    }

    /// Make every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: StoreOperation) {
        self.failing.write().insert(operation);
    }

    fn check(&self, operation: StoreOperation) -> Result<(), PipelineError> {
        if self.failing.read().contains(&operation) {
            return Err(PipelineError::storage(
                operation.as_str(),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn not_found(operation: StoreOperation, locator: &ObjectLocator) -> PipelineError {
        PipelineError::storage(operation.as_str(), format!("NoSuchKey: {}", locator))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Bytes, PipelineError> {
        self.get_object_calls.lock().push(locator.clone());
        self.check(StoreOperation::GetObject)?;
        self.objects
            .read()
            .get(locator)
            .map(|object| object.body.clone())
            .ok_or_else(|| Self::not_found(StoreOperation::GetObject, locator))
    }

    async fn put_object(
        &self,
        locator: &ObjectLocator,
        body: Bytes,
        content_type: &str,
        tags: &TagSet,
    ) -> Result<(), PipelineError> {
        self.check(StoreOperation::PutObject)?;
        self.puts.lock().push(PutRecord {
            locator: locator.clone(),
            content_type: content_type.to_string(),
            size: body.len(),
            tags: tags.clone(),
        });
        self.objects.write().insert(
            locator.clone(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                tags: tags.clone(),
            },
        );
        Ok(())
    }

    async fn get_tags(&self, locator: &ObjectLocator) -> Result<TagSet, PipelineError> {
        self.check(StoreOperation::GetTags)?;
        self.objects
            .read()
            .get(locator)
            .map(|object| object.tags.clone())
            .ok_or_else(|| Self::not_found(StoreOperation::GetTags, locator))
    }

    async fn put_tags(&self, locator: &ObjectLocator, tags: &TagSet) -> Result<(), PipelineError> {
        self.check(StoreOperation::PutTags)?;
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(locator)
            .ok_or_else(|| Self::not_found(StoreOperation::PutTags, locator))?;
        object.tags = tags.clone();
        self.tag_writes.lock().push((locator.clone(), tags.clone()));
        Ok(())
    }
}
