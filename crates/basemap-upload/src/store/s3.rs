use std::path::Path;

use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{ObjectStore, PutOutcome, StoreError};

/// Content type set on uploaded objects.
pub const TIFF_CONTENT_TYPE: &str = "image/tiff";

/// S3 (or S3-compatible) object store.
///
/// Calls are made synchronously on a private current-thread runtime, one
/// request at a time.
pub struct S3ObjectStore {
    client: Client,
    runtime: Runtime,
    content_type: String,
}

impl S3ObjectStore {
    /// Build a client from the standard AWS environment (credentials, region,
    /// profile). With `endpoint_url` set, requests go to that endpoint using
    /// path-style addressing.
    pub fn from_env(endpoint_url: Option<&str>) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let client = runtime.block_on(async {
            let mut loader = aws_config::from_env();
            if let Some(url) = endpoint_url {
                loader = loader.endpoint_url(url);
            }
            let aws_config = loader.load().await;

            let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
            if aws_config.region().is_none() {
                s3_config = s3_config.region(Region::new("us-east-1"));
            }
            if endpoint_url.is_some() {
                s3_config = s3_config.force_path_style(true);
            }
            Client::from_conf(s3_config.build())
        });

        info!(endpoint = ?endpoint_url, "S3 client ready");
        Ok(Self {
            client,
            runtime,
            content_type: TIFF_CONTENT_TYPE.to_string(),
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::Remote {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        message: DisplayErrorContext(&service_error).to_string(),
                    })
                }
            }
        }
    }

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::LocalFile {
                path: local_path.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .server_side_encryption(ServerSideEncryption::AwsKms)
            .content_type(&self.content_type)
            .send()
            .await
            .map_err(|err| StoreError::Remote {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(())
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, local_path: &Path, bucket: &str, key: &str) -> Result<PutOutcome, StoreError> {
        self.runtime.block_on(async {
            if self.exists(bucket, key).await? {
                debug!(bucket, key, "Object already present");
                return Ok(PutOutcome::AlreadyExists);
            }

            self.upload(local_path, bucket, key).await?;
            debug!(?local_path, bucket, key, "Object uploaded");
            Ok(PutOutcome::Uploaded)
        })
    }
}
