//! S3-backed object store

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Tag as S3Tag, Tagging};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;

use super::{ObjectLocator, ObjectStore, Tag, TagSet};
use crate::config::StorageConfig;
use crate::error::PipelineError;

/// `ObjectStore` over the AWS SDK (works with any S3-compatible endpoint).
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Build a client from the storage section of the configuration.
    ///
    /// Static credentials from the configuration win; otherwise they come
    /// from the standard AWS provider chain.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "imgpipe-config",
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::new(S3Client::from_conf(s3_config))
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }
}

fn sdk_error<E>(operation: &str, locator: &ObjectLocator, err: E) -> PipelineError
where
    E: std::error::Error,
{
    PipelineError::storage(
        operation,
        format!("{}: {}", locator, DisplayErrorContext(err)),
    )
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, locator: &ObjectLocator) -> Result<Bytes, PipelineError> {
        let response = self
            .client
            .get_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .send()
            .await
            .map_err(|e| sdk_error("get_object", locator, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| sdk_error("get_object", locator, e))?;

        Ok(data.into_bytes())
    }

    async fn put_object(
        &self,
        locator: &ObjectLocator,
        body: Bytes,
        content_type: &str,
        tags: &TagSet,
    ) -> Result<(), PipelineError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .content_type(content_type)
            .body(ByteStream::from(body));

        if !tags.is_empty() {
            request = request.tagging(tags.to_query_string());
        }

        request
            .send()
            .await
            .map_err(|e| sdk_error("put_object", locator, e))?;

        Ok(())
    }

    async fn get_tags(&self, locator: &ObjectLocator) -> Result<TagSet, PipelineError> {
        let response = self
            .client
            .get_object_tagging()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .send()
            .await
            .map_err(|e| sdk_error("get_tags", locator, e))?;

        Ok(response
            .tag_set()
            .iter()
            .map(|tag| Tag::new(tag.key(), tag.value()))
            .collect())
    }

    async fn put_tags(&self, locator: &ObjectLocator, tags: &TagSet) -> Result<(), PipelineError> {
        let tag_set = tags
            .iter()
            .map(|tag| {
                S3Tag::builder()
                    .key(&tag.key)
                    .value(&tag.value)
                    .build()
                    .map_err(|e| sdk_error("put_tags", locator, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| sdk_error("put_tags", locator, e))?;

        self.client
            .put_object_tagging()
            .bucket(&locator.bucket)
            .key(&locator.key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error("put_tags", locator, e))?;

        Ok(())
    }
}
