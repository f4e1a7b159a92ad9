//! S3 artifact store.
//!
//! `put_object` is all-or-nothing, so an object that `head_object` can see
//! is always complete. Keys are written under an optional prefix.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use cloudmusic_core::storage::{join_key, ArtifactStore, StoreError};

/// Artifact store backed by one S3 bucket.
pub struct S3Store {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Wrap an existing client.
    ///
    /// * `bucket` - bucket name, without `s3://`
    /// * `prefix` - key prefix, may be empty
    pub fn new(client: S3Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Build a client from the default AWS provider chain.
    pub async fn from_env(bucket: String, prefix: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        tracing::debug!(
            region = ?config.region(),
            bucket = %bucket,
            "Loaded AWS configuration",
        );
        Self::new(S3Client::new(&config), bucket, prefix)
    }

    fn object_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    async fn put_stream(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Write {
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!(bucket = %self.bucket, key = %object_key, "Uploaded object");
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::Exists {
                        key: key.to_string(),
                        reason: DisplayErrorContext(&service_err).to_string(),
                    })
                }
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.put_stream(key, ByteStream::from(bytes), content_type)
            .await
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Write {
                key: key.to_string(),
                reason: format!("cannot stream {}: {e}", path.display()),
            })?;
        self.put_stream(key, body, content_type).await
    }

    fn describe(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}
