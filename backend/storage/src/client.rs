use async_trait::async_trait;
use cipherbus_core::{Mode, Operation, PipelineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Upload body for `POST /post-image`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub user_id: String,
    pub operation: Operation,
    pub mode: Mode,
    pub image_name: String,
    pub img_base64: String,
}

impl fmt::Debug for StoredImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredImage")
            .field("user_id", &self.user_id)
            .field("operation", &self.operation)
            .field("mode", &self.mode)
            .field("image_name", &self.image_name)
            .field("img_base64_len", &self.img_base64.len())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unreachable: {0}")]
    Unreachable(String),

    #[error("storage rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::StorageUnavailable(err.to_string())
    }
}

/// Where finished artifacts go.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Insert or replace the artifact keyed by (user, image name, operation, mode).
    async fn store(&self, image: &StoredImage) -> Result<(), StorageError>;
}

/// Talks to a storage service over HTTP.
#[derive(Clone)]
pub struct HttpStorageClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStorageClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn store(&self, image: &StoredImage) -> Result<(), StorageError> {
        let url = format!("{}/post-image", self.base_url);
        debug!(%url, image = ?image, "Uploading artifact");

        let response = self
            .client
            .post(&url)
            .json(image)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(user_id = %image.user_id, image_name = %image.image_name, "Artifact stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_camel_case() {
        let image = StoredImage {
            user_id: "u1".into(),
            operation: Operation::Encrypt,
            mode: Mode::Cbc,
            image_name: "photo_output.bin".into(),
            img_base64: "AAEC".into(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "userId": "u1",
                "operation": "encrypt",
                "mode": "CBC",
                "imageName": "photo_output.bin",
                "imgBase64": "AAEC"
            })
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpStorageClient::new("http://c05:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://c05:3000");
    }

    #[tokio::test]
    async fn unreachable_storage_maps_to_storage_unavailable() {
        // Nothing listens on the discard port.
        let client = HttpStorageClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let image = StoredImage {
            user_id: "u1".into(),
            operation: Operation::Decrypt,
            mode: Mode::Ecb,
            image_name: "photo_outputdecrypted.bmp".into(),
            img_base64: "AAEC".into(),
        };
        let err = client.store(&image).await.unwrap_err();
        assert!(matches!(
            PipelineError::from(err),
            PipelineError::StorageUnavailable(_)
        ));
    }
}
