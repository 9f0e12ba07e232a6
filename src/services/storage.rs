//! Object storage collaborator
//!
//! Certificate artifacts are PUT to a configured blob-store base URL and
//! addressed by key. A missing configuration is reported distinctly from a
//! failed request so callers can tell "not set up" from "broken".

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

/// Storage collaborator failure modes
#[derive(Error, Debug)]
pub enum StorageError {
    /// No base URL configured; distinct from an upload failure
    #[error("object storage is not configured")]
    NotConfigured,

    /// The request could not be sent or timed out
    #[error("storage request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status
    #[error("storage returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A successfully stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Durable URL of the stored object
    pub url: String,
}

/// Durable blob storage for certificate artifacts
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Whether a storage backend is configured at all
    fn is_configured(&self) -> bool;

    /// Upload an object under `key`, returning its durable URL
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Delete the object under `key`; deleting an absent object succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// HTTP blob-store client (`PUT`/`DELETE {base_url}/{key}`)
pub struct HttpObjectStorage {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl HttpObjectStorage {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { base_url, client }
    }

    fn object_url(&self, key: &str) -> Result<String, StorageError> {
        let base = self.base_url.as_deref().ok_or(StorageError::NotConfigured)?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), key))
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let url = self.object_url(key)?;

        debug!(url = %url, size = data.len(), "uploading artifact to blob store");

        let response = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status { status, body });
        }

        info!(url = %url, "artifact uploaded");
        Ok(StoredObject { url })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let url = self.object_url(key)?;

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        // Already-gone is success for a delete
        if !response.status().is_success() && response.status().as_u16() != 404 {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status { status, body });
        }

        info!(url = %url, "artifact deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_store_reports_distinct_error() {
        let storage = HttpObjectStorage::new(None);
        assert!(!storage.is_configured());

        let err = storage
            .upload(vec![1, 2, 3], "certificates/x.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));

        let err = storage.delete("certificates/x.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));
    }

    #[test]
    fn test_object_url_joins_without_double_slash() {
        let storage = HttpObjectStorage::new(Some("https://blobs.example.com/lectern/".into()));
        assert_eq!(
            storage.object_url("certificates/c.pdf").unwrap(),
            "https://blobs.example.com/lectern/certificates/c.pdf"
        );
    }
}
