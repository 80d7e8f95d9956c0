//! Object store port and S3 adapter
//!
//! The pipeline core talks to [`ObjectStore`]; `S3Store` is the thin
//! aws-sdk-s3 implementation. Provider errors are mapped into the pipeline
//! taxonomy here so the core never inspects SDK types: a missing object is
//! `FileNotFound`, a 403 is `Permission`, anything transport-shaped is
//! `Network` (and therefore retryable by the outer policy).

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use tabload_common::{PipelineError, Result};
use tracing::{debug, info, instrument};

pub mod config;

/// Collaborator port for the object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether the bucket exists and is reachable with current credentials.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Whether the object exists. Permission failures surface as errors,
    /// not `false`.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Object size in bytes.
    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64>;

    /// Read the whole object.
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Read at most `max_bytes` from the start of the object.
    async fn read_head(&self, bucket: &str, key: &str, max_bytes: u64) -> Result<Vec<u8>>;

    /// Server-side copy within a bucket.
    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;

    /// Delete an object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// S3-backed [`ObjectStore`] implementation.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: config::StorageConfig) -> Self {
        debug!("Initializing object store client");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "tabload-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!("Object store client initialized");

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if is_not_found(&e.to_string()) {
                    Ok(false)
                } else {
                    Err(map_provider_error(&e.to_string(), bucket))
                }
            },
        }
    }

    #[instrument(skip(self))]
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if is_not_found(&e.to_string()) {
                    Ok(false)
                } else {
                    Err(map_provider_error(&e.to_string(), key))
                }
            },
        }
    }

    #[instrument(skip(self))]
    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_provider_error(&e.to_string(), key))?;

        Ok(response.content_length().unwrap_or(0).max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Reading s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_provider_error(&e.to_string(), key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::Network(format!("failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        debug!("Read {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn read_head(&self, bucket: &str, key: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let range = format!("bytes=0-{}", max_bytes.saturating_sub(1));

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await
            .map_err(|e| map_provider_error(&e.to_string(), key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::Network(format!("failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        debug!("Copying s3://{}/{} to s3://{}/{}", bucket, src_key, bucket, dst_key);

        let copy_source = format!("{}/{}", bucket, src_key);

        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(&copy_source)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| map_provider_error(&e.to_string(), src_key))?;

        info!("Copied s3://{}/{} to s3://{}/{}", bucket, src_key, bucket, dst_key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_provider_error(&e.to_string(), key))?;

        info!("Deleted s3://{}/{}", bucket, key);

        Ok(())
    }
}

/// Provider error text is not a stable contract; the match here mirrors the
/// wordings the SDK actually produces for the status codes we care about.
fn is_not_found(message: &str) -> bool {
    message.contains("NotFound")
        || message.contains("NoSuchKey")
        || message.contains("NoSuchBucket")
        || message.contains("404")
}

fn is_forbidden(message: &str) -> bool {
    message.contains("AccessDenied")
        || message.contains("Forbidden")
        || message.contains("403")
}

fn map_provider_error(message: &str, subject: &str) -> PipelineError {
    if is_not_found(message) {
        PipelineError::FileNotFound(format!("{}: {}", subject, message))
    } else if is_forbidden(message) {
        PipelineError::Permission(format!("{}: {}", subject, message))
    } else {
        PipelineError::Network(format!("{}: {}", subject, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("service error: NotFound"));
        assert!(is_not_found("NoSuchKey: the key does not exist"));
        assert!(is_not_found("http status: 404"));
        assert!(!is_not_found("connection reset"));
    }

    #[test]
    fn test_forbidden_detection() {
        assert!(is_forbidden("AccessDenied: no s3:GetObject"));
        assert!(is_forbidden("http status: 403"));
        assert!(!is_forbidden("http status: 404"));
    }

    #[test]
    fn test_provider_error_mapping() {
        assert!(matches!(
            map_provider_error("NoSuchKey", "in/sales.csv"),
            PipelineError::FileNotFound(_)
        ));
        assert!(matches!(
            map_provider_error("AccessDenied", "in/sales.csv"),
            PipelineError::Permission(_)
        ));
        assert!(matches!(
            map_provider_error("dispatch failure: timed out", "in/sales.csv"),
            PipelineError::Network(_)
        ));
    }
}
