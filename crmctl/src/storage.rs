//! Blob storage for verification documents.
//!
//! Document metadata lives in PostgreSQL; the bytes go to a [`DocumentStorage`] backend
//! chosen by `documents.storage` in config. Uploads are validated with
//! [`validate_content_type`] and [`check_size`] before anything reaches a backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::{DocumentsConfig, StorageConfig};
use crate::types::{DocumentId, OrganizationId};

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Why an upload was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentRejection {
    #[error("Unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("File exceeds the maximum size of {max} bytes")]
    TooLarge { max: u64 },

    #[error("File is empty")]
    Empty,
}

/// Check the declared content type against the allow-list
pub fn validate_content_type(content_type: &str, config: &DocumentsConfig) -> std::result::Result<(), DocumentRejection> {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if config.allowed_content_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&essence)) {
        Ok(())
    } else {
        Err(DocumentRejection::UnsupportedType(essence))
    }
}

/// Check a running byte count against the size limit
pub fn check_size(size: u64, config: &DocumentsConfig) -> std::result::Result<(), DocumentRejection> {
    if size > config.max_file_size {
        Err(DocumentRejection::TooLarge {
            max: config.max_file_size,
        })
    } else {
        Ok(())
    }
}

/// Storage key for a document; unique per document and grouped by tenant
pub fn document_key(organization_id: &OrganizationId, document_id: &DocumentId) -> String {
    format!("{organization_id}/{document_id}")
}

/// Trait for document storage backends
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, content: Bytes) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the configured backend
pub async fn create_storage(config: &StorageConfig) -> Arc<dyn DocumentStorage> {
    match config {
        StorageConfig::Local { path } => Arc::new(LocalStorage::new(path.clone())),
        StorageConfig::S3 { bucket, prefix, endpoint } => {
            Arc::new(S3Storage::from_env(bucket.clone(), prefix.clone(), endpoint.clone()).await)
        }
    }
}

/// Local filesystem storage backend - stores files in a directory
/// Useful for development and testing
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }
}

#[async_trait]
impl DocumentStorage for LocalStorage {
    async fn put(&self, key: &str, _content_type: &str, content: Bytes) -> Result<()> {
        let full_path = self.base_path.join(key);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        match fs::read(self.base_path.join(key)).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.base_path.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// S3 (or S3-compatible) storage backend. Credentials come from the standard AWS environment.
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Storage {
    pub async fn from_env(bucket: String, prefix: Option<String>, endpoint: Option<String>) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
            prefix,
        }
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStorage for S3Storage {
    async fn put(&self, key: &str, content_type: &str, content: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(content))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put_object failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(format!("get_object failed: {e}"))
                }
            })?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("reading object body failed: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("delete_object failed: {e}")))?;
        Ok(())
    }
}
