//! Filesystem backend
//!
//! Objects are stored as `<root>/<bucket>/<key>`. Presigned URLs point at
//! this service's `/api/v1/files` route and carry an HMAC over bucket, key
//! and expiry.

use super::sigv4::uri_encode;
use super::{guess_content_type, ObjectInfo, ObjectRef, ObjectStore, StorageError, StoredObject};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub struct LocalObjectStore {
    root: PathBuf,
    signing_key: Vec<u8>,
    /// Base URL of the file route, without trailing slash
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, signing_key: &[u8], base_url: String) -> Self {
        Self {
            root,
            signing_key: signing_key.to_vec(),
            base_url,
        }
    }

    /// Resolve an object to a path inside the root, rejecting traversal
    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf, StorageError> {
        validate_bucket(&object.bucket)?;
        let key = Path::new(&object.key);
        let safe = !object.key.is_empty()
            && key
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidReference(object.to_reference()));
        }
        Ok(self.root.join(&object.bucket).join(key))
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> Hmac<Sha256> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.signing_key).expect("HMAC accepts keys of any length");
        mac.update(format!("{}/{}\n{}", bucket, key, expires).as_bytes());
        mac
    }

    /// Check a signature produced by [`ObjectStore::presigned_get_url`]
    pub fn verify_signature(&self, bucket: &str, key: &str, expires: i64, signature: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        self.mac(bucket, key, expires).verify_slice(&bytes).is_ok()
    }
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && !bucket.contains("..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidReference(format!("invalid bucket name '{}'", bucket)))
    }
}

fn map_not_found(err: std::io::Error, object: &ObjectRef) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(object.to_reference())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn put(&self, object: &ObjectRef, data: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        let path = self.object_path(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, object: &ObjectRef) -> Result<StoredObject, StorageError> {
        let path = self.object_path(object)?;
        let data = tokio::fs::read(&path).await.map_err(|e| map_not_found(e, object))?;
        Ok(StoredObject {
            data,
            content_type: guess_content_type(&object.key).to_string(),
        })
    }

    async fn stat(&self, object: &ObjectRef) -> Result<ObjectInfo, StorageError> {
        let path = self.object_path(object)?;
        let meta = tokio::fs::metadata(&path).await.map_err(|e| map_not_found(e, object))?;
        Ok(ObjectInfo {
            size: meta.len(),
            content_type: guess_content_type(&object.key).to_string(),
        })
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let path = self.object_path(object)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn presigned_get_url(&self, object: &ObjectRef, expires: Duration) -> Result<String, StorageError> {
        self.object_path(object)?;
        let expires_at = Utc::now().timestamp() + expires.as_secs() as i64;
        let signature = hex::encode(self.mac(&object.bucket, &object.key, expires_at).finalize().into_bytes());
        Ok(format!(
            "{}/{}/{}?expires={}&signature={}",
            self.base_url,
            object.bucket,
            uri_encode(&object.key, true),
            expires_at,
            signature
        ))
    }

    fn verify_presigned(&self, object: &ObjectRef, expires: i64, signature: &str) -> bool {
        self.verify_signature(&object.bucket, &object.key, expires, signature)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
