//! S3-backed lock store
//!
//! Lock markers are plain objects in a shared bucket; see [`crate::lock`]
//! for the locking protocol built on top.

use crate::aws::context::AwsContext;
use crate::aws::error::classify_sdk_error;
use crate::lock::LockStore;
use anyhow::{Context, Result};
use aws_sdk_s3::{Client, primitives::ByteStream};
use tracing::debug;

/// Lock objects stored in one S3 bucket
pub struct S3LockStore {
    client: Client,
    bucket: String,
}

impl S3LockStore {
    /// Create a lock store from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext, bucket: &str) -> Self {
        Self {
            client: ctx.s3_client(),
            bucket: bucket.to_string(),
        }
    }
}

impl LockStore for S3LockStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        debug!(bucket = %self.bucket, key = %key, size = body.len(), "Writing lock object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to write s3://{}/{}", self.bucket, key))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(bucket = %self.bucket, key = %key, "Deleting lock object");

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))
            .with_context(|| format!("Failed to list s3://{}/{}", self.bucket, prefix))?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let classified = classify_sdk_error(&e);
                if classified.is_not_found() {
                    return Ok(None);
                }
                return Err(classified)
                    .with_context(|| format!("Failed to read s3://{}/{}", self.bucket, key));
            }
        };

        let body = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{}", self.bucket, key))?;

        Ok(Some(body.into_bytes().to_vec()))
    }
}
