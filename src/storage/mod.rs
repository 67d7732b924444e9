//! Object storage collaborator
//!
//! The pipeline only needs four things from a bucket/key namespace: read an
//! object, write an object with tags, read tags, write tags. `ObjectStore`
//! captures exactly that, with an S3 implementation for production and an
//! in-memory one for tests and local dry runs.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::error::PipelineError;

pub use memory::{MemoryObjectStore, PutRecord, StoreOperation, StoredObject};
pub use s3::S3ObjectStore;

/// Bucket/key identity of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `bucket/key/with/slashes`, splitting on the first `/`.
    pub fn parse(locator: &str) -> Option<Self> {
        let (bucket, key) = locator.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }

    /// Last path component of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One object tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered tag set. Keys are unique; inserting an existing key replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|tag| tag.key == key) {
            Some(existing) => existing.value = value,
            None => self.tags.push(Tag { key, value }),
        }
    }

    /// Insert every tag of `other`, replacing values of shared keys.
    pub fn merge(&mut self, other: &TagSet) {
        for tag in &other.tags {
            self.insert(tag.key.clone(), tag.value.clone());
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// URL-encoded `k=v&k=v`, the format S3 expects in the tagging header.
    pub fn to_query_string(&self) -> String {
        self.tags
            .iter()
            .map(|tag| {
                format!(
                    "{}={}",
                    urlencoding::encode(&tag.key),
                    urlencoding::encode(&tag.value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag.key, tag.value);
        }
        set
    }
}

/// Object storage operations the pipeline depends on.
///
/// Every failure is reported as `PipelineError::StorageError`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the whole object body.
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Bytes, PipelineError>;

    /// Write (create or replace) an object together with its tag set.
    async fn put_object(
        &self,
        locator: &ObjectLocator,
        body: Bytes,
        content_type: &str,
        tags: &TagSet,
    ) -> Result<(), PipelineError>;

    /// Read the object's tag set.
    async fn get_tags(&self, locator: &ObjectLocator) -> Result<TagSet, PipelineError>;

    /// Replace the object's tag set.
    async fn put_tags(&self, locator: &ObjectLocator, tags: &TagSet) -> Result<(), PipelineError>;
}
