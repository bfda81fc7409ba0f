//! Object storage for payment screenshots.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

const SCREENSHOT_FOLDER: &str = "downdating/payment-screenshots";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Refusing to upload an empty object")]
    EmptyObject,

    #[error("Storage request failed: {0}")]
    Transport(String),

    #[error("Storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` and return the public URL of the object.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// Public URL for `key` in `bucket`.
///
/// `base` may be a template with `{bucket}`/`{key}` placeholders, may already
/// include the bucket, or may be a bare host.
pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    if trimmed.ends_with(&format!("/{}", bucket)) {
        format!("{}/{}", trimmed, key)
    } else {
        format!("{}/{}/{}", trimmed, bucket, key)
    }
}

/// Storage API speaking `POST {api}/object/{bucket}/{key}` with a service key.
pub struct HttpObjectStorage {
    client: Client,
    config: StorageConfig,
}

impl HttpObjectStorage {
    pub fn new(config: StorageConfig, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyObject);
        }

        let key = format!("{}/{}-{}", SCREENSHOT_FOLDER, Uuid::new_v4(), filename);
        let url = format!(
            "{}/object/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bucket,
            key
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.service_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, %key, "Object upload failed");
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let public_url = build_public_url(&self.config.public_base_url, &self.config.bucket, &key);
        tracing::info!(%public_url, "Object uploaded");
        Ok(public_url)
    }
}
