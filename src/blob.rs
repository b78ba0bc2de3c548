//! Blob containers.
//!
//! Blobs are addressed by the SHA-1 digest of their content under
//! `/_blobs/<container>/<digest>`. Each call is a single request.

use crate::client::Client;
use crate::error::{MonkError, MonkResult};
use crate::transport::{Method, Request};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fmt;
use std::sync::Arc;

/// Hex SHA-1 digest of `data`.
pub fn compute_digest(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

/// Handle to one blob table.
#[derive(Debug, Clone)]
pub struct BlobContainer {
    name: String,
    client: Arc<Client>,
}

impl BlobContainer {
    pub fn new(name: impl Into<String>, client: Arc<Client>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn path(&self, digest: &str) -> String {
        format!("/_blobs/{}/{}", self.name, digest)
    }

    /// Upload `data` and return its digest.
    pub async fn put(&self, data: impl Into<Bytes>) -> MonkResult<String> {
        let data = data.into();
        let digest = compute_digest(&data);
        let response = self.client.request(self.upload(&digest, data)).await?;
        match response.status {
            201 => Ok(digest),
            status => Err(self.unexpected("put", &digest, status)),
        }
    }

    /// Upload under a caller-supplied digest. Returns whether the blob was
    /// created.
    pub async fn put_with_digest(&self, data: impl Into<Bytes>, digest: &str) -> MonkResult<bool> {
        let response = self.client.request(self.upload(digest, data.into())).await?;
        Ok(response.status == 201)
    }

    fn upload(&self, digest: &str, data: Bytes) -> Request {
        Request::new(Method::PUT, self.path(digest))
            .header("Content-Type", "application/octet-stream")
            .body(data)
    }

    pub async fn get(&self, digest: &str) -> MonkResult<Bytes> {
        let request = Request::new(Method::GET, self.path(digest));
        let response = self.client.request(request).await?;
        match response.status {
            200 => Ok(response.body),
            404 => Err(MonkError::DigestNotFound {
                container: self.name.clone(),
                digest: digest.to_string(),
            }),
            status => Err(self.unexpected("get", digest, status)),
        }
    }

    /// Delete a blob. Returns `false` if it did not exist.
    pub async fn delete(&self, digest: &str) -> MonkResult<bool> {
        let request = Request::new(Method::DELETE, self.path(digest));
        let response = self.client.request(request).await?;
        match response.status {
            204 => Ok(true),
            404 => Ok(false),
            status => {
                tracing::warn!("Delete of {}/{} returned {}", self.name, digest, status);
                Err(MonkError::BlobLocationNotFound {
                    container: self.name.clone(),
                    digest: digest.to_string(),
                })
            }
        }
    }

    pub async fn exists(&self, digest: &str) -> MonkResult<bool> {
        let request = Request::new(Method::HEAD, self.path(digest));
        let response = self.client.request(request).await?;
        Ok(response.status == 200)
    }

    fn unexpected(&self, op: &str, digest: &str, status: u16) -> MonkError {
        MonkError::Operational {
            message: format!(
                "Blob {} of {}/{} failed with status {}",
                op, self.name, digest, status
            ),
            trace: None,
        }
    }
}

impl fmt::Display for BlobContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<BlobContainer '{}'>", self.name)
    }
}
