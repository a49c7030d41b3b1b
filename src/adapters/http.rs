//! HTTP gateways: control-plane notifications and object storage uploads.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::{ControlPlane, ObjectStorage, RecordingNotice};
use crate::error::GatewayError;

/// Control-plane client over HTTP
pub struct HttpControlPlane {
    /// Base URL of the core API
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Idempotency key for a recording notification
///
/// Stable across retries so the control plane can drop duplicates.
pub fn notice_idempotency_key(notice: &RecordingNotice) -> String {
    let mut hasher = Sha256::new();
    hasher.update(notice.session_run_id.as_bytes());
    hasher.update(b":");
    hasher.update(notice.key.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..32].to_string()
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn notify_recording(&self, notice: &RecordingNotice) -> Result<(), GatewayError> {
        let url = self.api_url("recordings");

        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", notice_idempotency_key(notice))
            .json(notice)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Object storage client using plain HTTP PUT
pub struct HttpObjectStorage {
    base_url: String,
    bucket: String,
    client: reqwest::Client,
}

impl HttpObjectStorage {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bucket: bucket.into(),
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.bucket.is_empty() {
            format!("{}/{}", base, key)
        } else {
            format!("{}/{}/{}", base, self.bucket, key)
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    fn name(&self) -> &str {
        "http-object-storage"
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, GatewayError> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(key.to_string())
    }
}
