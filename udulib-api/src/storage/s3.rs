//! S3-compatible (MinIO) backend over path-style REST calls

use super::sigv4::{sha256_hex, uri_encode, SigV4Signer};
use super::{ObjectInfo, ObjectRef, ObjectStore, StorageError, StoredObject};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use udulib_common::config::StorageConfig;

/// Host and scheme of an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    scheme: &'static str,
    host: String,
}

impl Endpoint {
    /// Accepts `host:port` or a full `http(s)://host:port` URL
    fn parse(raw: &str, secure: bool) -> Result<Self, StorageError> {
        let raw = raw.trim().trim_end_matches('/');
        let (scheme, host) = if let Some(rest) = raw.strip_prefix("https://") {
            ("https", rest)
        } else if let Some(rest) = raw.strip_prefix("http://") {
            ("http", rest)
        } else if secure {
            ("https", raw)
        } else {
            ("http", raw)
        };
        if host.is_empty() || host.contains('/') {
            return Err(StorageError::Config(format!("Invalid storage endpoint: {}", raw)));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
        })
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}://{}{}", self.scheme, self.host, path_and_query)
    }
}

pub struct S3ObjectStore {
    client: reqwest::Client,
    signer: SigV4Signer,
    endpoint: Endpoint,
    /// Endpoint presigned URLs are generated for
    public_endpoint: Endpoint,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let endpoint = Endpoint::parse(&config.endpoint, config.secure)?;
        let public_endpoint = match &config.external_endpoint {
            Some(external) if !external.trim().is_empty() => Endpoint::parse(external, config.secure)?,
            _ => endpoint.clone(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        info!(
            "MinIO storage at {}://{} (public {}://{})",
            endpoint.scheme, endpoint.host, public_endpoint.scheme, public_endpoint.host
        );

        Ok(Self {
            client,
            signer: SigV4Signer::new(&config.access_key, &config.secret_key, &config.region),
            endpoint,
            public_endpoint,
        })
    }

    fn object_path(object: &ObjectRef) -> String {
        format!("/{}/{}", uri_encode(&object.bucket, false), uri_encode(&object.key, true))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, StorageError> {
        let payload_hash = sha256_hex(body.as_deref().unwrap_or_default());
        let headers = self.signer.sign_request(
            method.as_str(),
            &self.endpoint.host,
            path,
            &[],
            &payload_hash,
            Utc::now(),
        );

        let mut request = self.client.request(method.clone(), self.endpoint.url(path));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        debug!("{} {}", method, path);
        Ok(request.send().await?)
    }
}

/// Turn a non-success response into a storage error
async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(what.to_string()));
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Backend {
        status: status.as_u16(),
        message: if message.is_empty() { what.to_string() } else { message },
    })
}

fn header_str(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let path = format!("/{}", uri_encode(bucket, false));
        let head = self.send(Method::HEAD, &path, None, None).await?;
        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return check(head, bucket).await.map(|_| ());
        }

        let created = self.send(Method::PUT, &path, Some(Vec::new()), None).await?;
        check(created, bucket).await?;
        info!("Bucket '{}' created successfully", bucket);
        Ok(())
    }

    async fn put(&self, object: &ObjectRef, data: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let path = Self::object_path(object);
        let response = self.send(Method::PUT, &path, Some(data), Some(content_type)).await?;
        check(response, &object.to_reference()).await?;
        Ok(())
    }

    async fn get(&self, object: &ObjectRef) -> Result<StoredObject, StorageError> {
        let path = Self::object_path(object);
        let response = check(
            self.send(Method::GET, &path, None, None).await?,
            &object.to_reference(),
        )
        .await?;
        let content_type = header_str(&response, header::CONTENT_TYPE)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = response.bytes().await?.to_vec();
        Ok(StoredObject { data, content_type })
    }

    async fn stat(&self, object: &ObjectRef) -> Result<ObjectInfo, StorageError> {
        let path = Self::object_path(object);
        let response = check(
            self.send(Method::HEAD, &path, None, None).await?,
            &object.to_reference(),
        )
        .await?;
        let size = header_str(&response, header::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let content_type = header_str(&response, header::CONTENT_TYPE)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(ObjectInfo { size, content_type })
    }

    async fn delete(&self, object: &ObjectRef) -> Result<(), StorageError> {
        let path = Self::object_path(object);
        match check(self.send(Method::DELETE, &path, None, None).await?, &object.to_reference()).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn presigned_get_url(&self, object: &ObjectRef, expires: Duration) -> Result<String, StorageError> {
        // Signed for the public host, since the Host header is part of the signature
        let path = Self::object_path(object);
        let query = self
            .signer
            .presign_query(&self.public_endpoint.host, &path, expires.as_secs(), Utc::now());
        Ok(self.public_endpoint.url(&format!("{}?{}", path, query)))
    }

    fn backend_name(&self) -> &'static str {
        "minio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        let e = Endpoint::parse("localhost:9000", false).unwrap();
        assert_eq!(e, Endpoint { scheme: "http", host: "localhost:9000".into() });

        let e = Endpoint::parse("minio.internal:9000", true).unwrap();
        assert_eq!(e.scheme, "https");

        let e = Endpoint::parse("https://files.example.edu/", false).unwrap();
        assert_eq!(e, Endpoint { scheme: "https", host: "files.example.edu".into() });

        assert!(Endpoint::parse("http://host/path", false).is_err());
        assert!(Endpoint::parse("", false).is_err());
    }

    #[test]
    fn test_presigned_url_uses_external_endpoint() {
        let config = StorageConfig {
            endpoint: "minio:9000".to_string(),
            external_endpoint: Some("https://files.example.edu".to_string()),
            ..StorageConfig::default()
        };
        let store = S3ObjectStore::new(&config).unwrap();
        let url = store
            .presigned_get_url(&ObjectRef::new("documents", "a b.pdf"), Duration::from_secs(3600))
            .unwrap();

        assert!(url.starts_with("https://files.example.edu/documents/a%20b.pdf?"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
    }
}
