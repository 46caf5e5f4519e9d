use crate::config::S3Config;
use crate::error::UploadError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Remote file store holding uploaded QR code images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `data` as `{folder}/{filename}` and return the stored path
    async fn save(&self, folder: &str, filename: &str, data: Vec<u8>)
        -> Result<String, UploadError>;

    /// Time-limited GET URL for a stored path
    async fn presigned_url(&self, path: &str, expires_in: Duration) -> Result<String>;
}

/// S3-backed file store
pub struct S3FileStore {
    client: S3Client,
    bucket: String,
}

impl S3FileStore {
    /// Create a new S3 file store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 file store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn save(
        &self,
        folder: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<String, UploadError> {
        let key = object_key(folder, filename);
        let content_type = get_content_type(filename);

        debug!(key = %key, "Uploading file to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::new(&key, DisplayErrorContext(&e)))?;

        info!(key = %key, "File uploaded");

        Ok(key)
    }

    async fn presigned_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(expires_in).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        Ok(presigned.uri().to_string())
    }
}

/// Build the object key for a file: `{folder}/{filename}`
pub fn object_key(folder: &str, filename: &str) -> String {
    format!(
        "{}/{}",
        sanitize_path_component(folder),
        sanitize_path_component(filename)
    )
}

/// Replace anything outside `[A-Za-z0-9._-]` so a component cannot add path segments
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Content type from the filename extension
fn get_content_type(filename: &str) -> &'static str {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension.to_lowercase().as_str() {
        "png" => "image/png",
        "jpeg" | "jpg" => "image/jpeg",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
