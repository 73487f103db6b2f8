//! Object storage for upload intake and generated media.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::debug;

/// How long a presigned read URL handed to the model stays valid.
const PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Short-lived URL an external reader (the model) can fetch the object from.
    async fn presigned_url(&self, key: &str) -> Result<String>;
    /// Reads generated media by locator: an `s3://bucket/key` URI or a plain HTTP(S) URL.
    async fn fetch(&self, locator: &str) -> Result<MediaBlob>;
}

#[derive(Clone)]
pub struct S3MediaStore {
    s3: S3Client,
    bucket: String,
    http: reqwest::Client,
}

impl S3MediaStore {
    pub fn new(s3: S3Client, bucket: String) -> Self {
        Self {
            s3,
            bucket,
            http: reqwest::Client::new(),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<MediaBlob> {
        let object = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 read failed: {e}"))?;
        let content_type = object
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| anyhow!("S3 body read failed: {e}"))?
            .into_bytes();
        Ok(MediaBlob {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("S3 upload failed: {e}"))?;
        debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 delete failed: {e}"))?;
        Ok(())
    }

    async fn presigned_url(&self, key: &str) -> Result<String> {
        let config = PresigningConfig::expires_in(PRESIGN_TTL)?;
        let request = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| anyhow!("S3 presign failed: {e}"))?;
        Ok(request.uri().to_string())
    }

    async fn fetch(&self, locator: &str) -> Result<MediaBlob> {
        if let Some((bucket, key)) = parse_s3_locator(locator) {
            return self.get_object(bucket, key).await;
        }

        let response = self.http.get(locator).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;
        Ok(MediaBlob {
            bytes,
            content_type,
        })
    }
}

/// Splits `s3://bucket/key` into its parts.
pub fn parse_s3_locator(locator: &str) -> Option<(&str, &str)> {
    let rest = locator.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}
