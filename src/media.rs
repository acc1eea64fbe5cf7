use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    config::{Builder as S3ConfigBuilder, IdentityCache},
    primitives::ByteStream,
};
use secrecy::ExposeSecret;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MediaConfig;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("upload error: {0}")]
    Upload(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("object store operation timed out")]
    Timeout,
}

/// Locator plus removable reference for one stored object. Until the owning
/// account row exists, whoever staged the object is responsible for deleting
/// it.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub url: String,
    pub object_key: String,
}

/// Raw file as received from a multipart request.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores the object and returns its public URL.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, MediaError>;

    async fn delete_object(&self, key: &str) -> Result<(), MediaError>;
}

/// S3-compatible store (R2, MinIO, AWS). Calls are raw; the bounded timeout
/// sits in [`MediaService`] so it covers any store implementation.
#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaStore {
    pub fn new(config: &MediaConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            config.secret_access_key.expose_secret(),
            None,
            None,
            "media-static",
        );

        let s3_config = S3ConfigBuilder::new()
            .region(aws_sdk_s3::config::Region::new("auto"))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .stalled_stream_protection(
                aws_sdk_s3::config::StalledStreamProtectionConfig::disabled(),
            )
            .identity_cache(IdentityCache::no_cache())
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, MediaError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| MediaError::Upload(e.to_string()))?;

        Ok(format!("{}/{key}", self.public_base_url))
    }

    async fn delete_object(&self, key: &str) -> Result<(), MediaError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| MediaError::Delete(e.to_string()))?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn MediaStore>,
    op_timeout: Duration,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    pub async fn stage(&self, folder: &str, upload: MediaUpload) -> Result<MediaHandle, MediaError> {
        let object_key = object_key(folder, &upload.filename);

        let put = self
            .store
            .put_object(&object_key, upload.bytes, &upload.content_type);
        let url = tokio::time::timeout(self.op_timeout, put)
            .await
            .map_err(|_| MediaError::Timeout)??;

        tracing::debug!(key = %object_key, "staged media object");
        Ok(MediaHandle { url, object_key })
    }

    /// Best-effort delete for compensation paths. Failures are logged, never
    /// propagated; a cleanup error must not mask the error that triggered the
    /// cleanup.
    pub async fn unstage(&self, handle: &MediaHandle) {
        let delete = self.store.delete_object(&handle.object_key);
        match tokio::time::timeout(self.op_timeout, delete).await {
            Ok(Ok(())) => {
                tracing::debug!(key = %handle.object_key, "unstaged media object");
            }
            Ok(Err(err)) => {
                tracing::warn!(key = %handle.object_key, error = ?err, "failed to unstage media object");
            }
            Err(_) => {
                tracing::warn!(key = %handle.object_key, "timed out unstaging media object");
            }
        }
    }
}

fn object_key(folder: &str, filename: &str) -> String {
    let id = Uuid::new_v4();
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{folder}/{id}.{}", ext.to_ascii_lowercase()),
        None => format!("{folder}/{id}"),
    }
}
