//! Object storage for uploaded files
//!
//! Blobs live in an [`ObjectStore`] backend (S3-compatible MinIO or a local
//! directory). Database rows keep a `minio://<bucket>/<object>` reference,
//! which [`Storage`] resolves back to a bucket and key.

pub mod local;
pub mod s3;
pub mod sigv4;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use udulib_common::config::{StorageBackend, StorageConfig};

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Scheme prefix of stored object references
pub const REFERENCE_SCHEME: &str = "minio://";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Not a stored object reference: {0}")]
    InvalidReference(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Bucket and key of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `minio://<bucket>/<object>`
    pub fn parse(reference: &str) -> Result<Self, StorageError> {
        let rest = reference
            .strip_prefix(REFERENCE_SCHEME)
            .ok_or_else(|| StorageError::InvalidReference(reference.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self::new(bucket, key)),
            _ => Err(StorageError::InvalidReference(reference.to_string())),
        }
    }

    pub fn to_reference(&self) -> String {
        format!("{}{}/{}", REFERENCE_SCHEME, self.bucket, self.key)
    }

    /// Last path segment of the key
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Bytes and content type of a downloaded object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Object metadata
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub size: u64,
    pub content_type: String,
}

/// Storage backend seam
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket when it does not exist yet
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn put(&self, object: &ObjectRef, data: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, object: &ObjectRef) -> Result<StoredObject, StorageError>;

    async fn stat(&self, object: &ObjectRef) -> Result<ObjectInfo, StorageError>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError>;

    /// Time-limited GET URL for the object
    fn presigned_get_url(&self, object: &ObjectRef, expires: Duration) -> Result<String, StorageError>;

    /// Validate a signature issued for this service's own file route
    fn verify_presigned(&self, _object: &ObjectRef, _expires: i64, _signature: &str) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str;
}

/// Names of the buckets used by the service
#[derive(Debug, Clone)]
pub struct Buckets {
    pub documents: String,
    pub avatars: String,
    pub major_images: String,
}

/// Handler-facing storage facade
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    buckets: Buckets,
    presign_expiry: Duration,
}

impl Storage {
    pub fn new(store: Arc<dyn ObjectStore>, buckets: Buckets, presign_expiry: Duration) -> Self {
        Self {
            store,
            buckets,
            presign_expiry,
        }
    }

    /// Build the configured backend
    pub fn from_config(config: &StorageConfig, signing_secret: &str, public_url: &str) -> Result<Self, StorageError> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::Local => Arc::new(LocalObjectStore::new(
                config.local_root.clone(),
                signing_secret.as_bytes(),
                format!("{}/api/v1/files", public_url.trim_end_matches('/')),
            )),
            StorageBackend::Minio => Arc::new(S3ObjectStore::new(config)?),
        };
        let buckets = Buckets {
            documents: config.document_bucket.clone(),
            avatars: config.avatar_bucket.clone(),
            major_images: config.major_image_bucket.clone(),
        };
        Ok(Self::new(store, buckets, Duration::from_secs(config.presign_expiry_secs)))
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Create all service buckets; failures are logged, not fatal
    pub async fn ensure_buckets(&self) {
        for bucket in [&self.buckets.documents, &self.buckets.avatars, &self.buckets.major_images] {
            match self.store.ensure_bucket(bucket).await {
                Ok(()) => info!("Bucket '{}' ready ({})", bucket, self.store.backend_name()),
                Err(e) => error!("Error creating bucket {}: {}", bucket, e),
            }
        }
    }

    /// Store `data` under a unique name and return its reference
    pub async fn upload(
        &self,
        bucket: &str,
        data: Vec<u8>,
        original_filename: &str,
        prefix: Option<&str>,
    ) -> Result<String, StorageError> {
        let object = ObjectRef::new(bucket, unique_object_name(original_filename, prefix));
        let content_type = guess_content_type(original_filename);
        self.store.put(&object, data, content_type).await?;
        Ok(object.to_reference())
    }

    pub async fn download(&self, reference: &str) -> Result<StoredObject, StorageError> {
        self.store.get(&ObjectRef::parse(reference)?).await
    }

    pub async fn stat(&self, reference: &str) -> Result<ObjectInfo, StorageError> {
        self.store.stat(&ObjectRef::parse(reference)?).await
    }

    /// Remove a stored object
    ///
    /// References outside object storage are ignored and report `false`.
    pub async fn delete(&self, reference: &str) -> Result<bool, StorageError> {
        match ObjectRef::parse(reference) {
            Ok(object) => {
                self.store.delete(&object).await?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Presigned GET URL with the configured lifetime
    pub fn presigned_url(&self, reference: &str) -> Result<String, StorageError> {
        self.store
            .presigned_get_url(&ObjectRef::parse(reference)?, self.presign_expiry)
    }

    /// Fetch an object served through the signed file route
    pub async fn fetch_signed(
        &self,
        object: &ObjectRef,
        expires: i64,
        signature: &str,
    ) -> Result<Option<StoredObject>, StorageError> {
        if !self.store.verify_presigned(object, expires, signature) {
            return Ok(None);
        }
        self.store.get(object).await.map(Some)
    }

    /// Best-effort delete used when replacing or removing blobs
    pub async fn delete_quietly(&self, reference: &str) {
        if let Err(e) = self.delete(reference).await {
            error!("Error deleting {} from storage: {}", reference, e);
        }
    }
}

/// Lowercased extension including the dot, or empty
pub fn file_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>_<uuid><ext>`, prefix omitted when absent
pub fn unique_object_name(original_filename: &str, prefix: Option<&str>) -> String {
    let ext = file_extension(original_filename);
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4();
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}_{}{}", prefix, timestamp, id, ext),
        None => format!("{}_{}{}", timestamp, id, ext),
    }
}

/// MIME type from the file extension
pub fn guess_content_type(filename: &str) -> &'static str {
    match file_extension(filename).as_str() {
        ".pdf" => "application/pdf",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".xls" => "application/vnd.ms-excel",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".ppt" => "application/vnd.ms-powerpoint",
        ".pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".txt" => "text/plain",
        ".md" => "text/markdown",
        ".csv" => "text/csv",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".webp" => "image/webp",
        ".zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
